use std::time::Duration;

use opshub_protocol::{LogRecord, MetricsSnapshot, OrbitQuery, ResourceFilter};
use serde_json::{Map, Value};

use crate::error::ClientError;
use crate::http::{build_client, get_json, join_url, read_json, send_checked};
use crate::shape::{coerce_list, coerce_object, first_number, first_text};

/// Client for the ORBIT operations-telemetry service.
#[derive(Clone)]
pub struct OrbitClient {
    base_url: String,
    http: reqwest::Client,
}

impl OrbitClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: base_url.into(),
            http: build_client(Some(timeout))?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&'static str, String)],
        fallback: &str,
    ) -> Result<Value, ClientError> {
        get_json(&self.http, &self.url(path), query, fallback).await
    }

    pub async fn clusters(&self) -> Result<Vec<Value>, ClientError> {
        let raw = self
            .get("/clusters/available", &[], "Failed to fetch clusters")
            .await?;
        Ok(coerce_list(raw, &["data", "clusters", "items"]))
    }

    pub async fn namespaces(&self, cluster: &str) -> Result<Vec<Value>, ClientError> {
        let path = format!("/clusters/{}/namespaces", path_segment(cluster)?);
        let raw = self.get(&path, &[], "Failed to fetch namespaces").await?;
        Ok(coerce_list(raw, &["data", "namespaces", "items"]))
    }

    pub async fn applications(&self, cluster: &str) -> Result<Vec<Value>, ClientError> {
        let path = format!("/clusters/{}/applications", path_segment(cluster)?);
        let raw = self.get(&path, &[], "Failed to fetch applications").await?;
        Ok(coerce_list(raw, &["data", "applications", "items"]))
    }

    pub async fn metrics(&self, filter: &ResourceFilter) -> Result<MetricsSnapshot, ClientError> {
        let scope = ResourceFilter {
            severity: None,
            ..filter.clone()
        };
        let raw = self
            .get("/metrics", &scope.query_pairs(), "Failed to fetch metrics")
            .await?;
        Ok(metrics_from(raw))
    }

    pub async fn logs(&self, filter: &ResourceFilter) -> Result<Vec<LogRecord>, ClientError> {
        let raw = self
            .get("/logs", &filter.query_pairs(), "Failed to fetch logs")
            .await?;
        let raw = backend_ok(raw, "Failed to fetch logs")?;
        Ok(coerce_list(raw, &["logs", "data", "items"])
            .iter()
            .map(log_from)
            .collect())
    }

    pub async fn correlated_alerts(&self, filter: &ResourceFilter) -> Result<Vec<Value>, ClientError> {
        let scope = ResourceFilter {
            severity: None,
            ..filter.clone()
        };
        let raw = self
            .get(
                "/alerts/correlated",
                &scope.query_pairs(),
                "Failed to fetch correlated alerts",
            )
            .await?;
        let raw = backend_ok(raw, "Failed to fetch correlated alerts")?;
        Ok(coerce_list(raw, &["correlated_alerts", "data", "alerts"]))
    }

    pub async fn streaming_alerts(&self) -> Result<Vec<Value>, ClientError> {
        let raw = self
            .get("/streaming/alerts", &[], "Failed to fetch streaming alerts")
            .await?;
        Ok(coerce_list(raw, &["data", "alerts", "items"]))
    }

    pub async fn query(&self, query: &OrbitQuery) -> Result<Value, ClientError> {
        let url = self.url("/orbit/query");
        let resp = send_checked(
            self.http.post(&url).json(query),
            &url,
            "Failed to execute query",
        )
        .await?;
        read_json(resp, &url).await
    }

    pub async fn ping(&self) -> Result<Value, ClientError> {
        self.get("/ping", &[], "Ping failed").await
    }

    pub async fn health(&self) -> Result<Value, ClientError> {
        self.get("/health", &[], "Health check failed").await
    }
}

fn path_segment(value: &str) -> Result<&str, ClientError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.contains(|c: char| matches!(c, '/' | '?' | '#')) {
        return Err(ClientError::InvalidSelection(format!(
            "invalid cluster name `{value}`"
        )));
    }
    Ok(trimmed)
}

/// `success: false` replies carry the reason in `error`.
fn backend_ok(raw: Value, fallback: &str) -> Result<Value, ClientError> {
    if raw.get("success").and_then(Value::as_bool) == Some(false) {
        let message = raw
            .get("error")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback);
        return Err(ClientError::Backend(message.to_string()));
    }
    Ok(raw)
}

pub(crate) fn metrics_from(raw: Value) -> MetricsSnapshot {
    if !raw.is_object() {
        return MetricsSnapshot::default();
    }
    let current: Map<String, Value> = match raw.get("metrics") {
        Some(Value::Object(metrics)) => match metrics.get("current") {
            Some(Value::Object(current)) => current.clone(),
            _ => metrics.clone(),
        },
        _ => coerce_object(raw.clone(), &["data"]),
    };
    let network = match (
        first_number(&current, &["network_in"]),
        first_number(&current, &["network_out"]),
    ) {
        (None, None) => first_number(&current, &["network"]).unwrap_or(0.0),
        (inbound, outbound) => inbound.unwrap_or(0.0) + outbound.unwrap_or(0.0),
    };
    MetricsSnapshot {
        cpu: first_number(&current, &["cpu_usage", "cpu", "cpuPercentage"]).unwrap_or(0.0),
        memory: first_number(&current, &["memory_usage", "memory", "memoryPercentage"])
            .unwrap_or(0.0),
        disk: first_number(&current, &["disk_usage", "disk", "diskPercentage"]).unwrap_or(0.0),
        network,
        response_time: first_number(&current, &["response_time", "latency"]).unwrap_or(0.0),
        error_rate: first_number(&current, &["error_rate", "errorRate"]).unwrap_or(0.0),
        raw,
    }
}

pub(crate) fn log_from(entry: &Value) -> LogRecord {
    let log = entry.as_object();
    let raw = log.and_then(|l| l.get("raw")).and_then(Value::as_object);
    let text = |keys: &[&str], raw_keys: &[&str], default: &str| -> String {
        first_text(log, keys)
            .or_else(|| first_text(raw, raw_keys))
            .unwrap_or(default)
            .to_string()
    };
    let timestamp = first_text(log, &["timestamp"])
        .or_else(|| first_text(raw, &["@timestamp"]))
        .map(str::to_string)
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true));
    LogRecord {
        timestamp,
        severity: text(&["level"], &["loglevel"], "INFO"),
        message: text(&["message"], &[], ""),
        source: text(&["source"], &["applicationName", "host"], ""),
        stack_trace: text(&[], &["stackTrace"], ""),
        logger: text(&[], &["logger"], ""),
        application_name: text(&[], &["applicationName"], ""),
        app_version: text(&[], &["appVersion"], ""),
        domain_name: text(&[], &["domainName"], ""),
        raw: raw
            .map(|r| Value::Object(r.clone()))
            .unwrap_or_else(|| Value::Object(Map::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> OrbitClient {
        OrbitClient::new(server.base_url(), Duration::from_secs(5)).expect("client")
    }

    #[test]
    fn metrics_unwrap_current_block() {
        let snap = metrics_from(json!({
            "metrics": {
                "current": {"cpu_usage": 41.5, "memoryPercentage": 70, "network_in": 1.5, "network_out": 2.0, "latency": 120},
                "units": {"network": "KB/s"}
            }
        }));
        assert_eq!(snap.cpu, 41.5);
        assert_eq!(snap.memory, 70.0);
        assert_eq!(snap.network, 3.5);
        assert_eq!(snap.response_time, 120.0);
        assert_eq!(snap.error_rate, 0.0);
        assert!(snap.raw.get("metrics").is_some());
    }

    #[test]
    fn metrics_read_data_wrapper_or_bare_object() {
        let wrapped = metrics_from(json!({"data": {"cpu": 10, "network": 4, "errorRate": 0.5}}));
        assert_eq!((wrapped.cpu, wrapped.network, wrapped.error_rate), (10.0, 4.0, 0.5));
        let bare = metrics_from(json!({"disk": 33}));
        assert_eq!(bare.disk, 33.0);
        assert_eq!(metrics_from(json!([1, 2])), MetricsSnapshot::default());
    }

    #[test]
    fn log_fields_fall_back_into_raw() {
        let record = log_from(&json!({
            "message": "boom",
            "raw": {
                "@timestamp": "2025-03-01T10:00:00Z",
                "loglevel": "ERROR",
                "host": "node-7",
                "stackTrace": "at main()",
                "appVersion": "1.2.3"
            }
        }));
        assert_eq!(record.timestamp, "2025-03-01T10:00:00Z");
        assert_eq!(record.severity, "ERROR");
        assert_eq!(record.source, "node-7");
        assert_eq!(record.stack_trace, "at main()");
        assert_eq!(record.app_version, "1.2.3");
        assert_eq!(record.logger, "");

        let bare = log_from(&json!({"level": "WARN"}));
        assert_eq!(bare.severity, "WARN");
        assert_eq!(bare.raw, json!({}));
        assert!(!bare.timestamp.is_empty());
    }

    #[tokio::test]
    async fn clusters_accept_any_list_shape() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/clusters/available");
                then.status(200).json_body(json!({"clusters": ["prod-east", "prod-west"]}));
            })
            .await;
        let clusters = client(&server).clusters().await.expect("clusters");
        assert_eq!(clusters, vec![json!("prod-east"), json!("prod-west")]);
    }

    #[tokio::test]
    async fn namespaces_use_cluster_path() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/clusters/prod-east/namespaces");
                then.status(200).json_body(json!(["default", "kube-system"]));
            })
            .await;
        let orbit = client(&server);
        let namespaces = orbit.namespaces("prod-east").await.expect("namespaces");
        mock.assert_async().await;
        assert_eq!(namespaces.len(), 2);
        assert!(matches!(
            orbit.namespaces("a/b").await,
            Err(ClientError::InvalidSelection(_))
        ));
    }

    #[tokio::test]
    async fn logs_pass_filters_and_surface_backend_errors() {
        let server = MockServer::start_async().await;
        let ok = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/logs")
                    .query_param("cluster", "prod")
                    .query_param("severity", "ERROR");
                then.status(200).json_body(json!({
                    "success": true,
                    "logs": [{"timestamp": "t1", "level": "ERROR", "message": "disk full"}]
                }));
            })
            .await;
        let failing = server
            .mock_async(|when, then| {
                when.method(GET).path("/logs").query_param("cluster", "broken");
                then.status(200)
                    .json_body(json!({"success": false, "error": "index unavailable"}));
            })
            .await;
        let orbit = client(&server);
        let logs = orbit
            .logs(&ResourceFilter {
                cluster: Some("prod".into()),
                severity: Some("ERROR".into()),
                ..Default::default()
            })
            .await
            .expect("logs");
        ok.assert_async().await;
        assert_eq!(logs[0].message, "disk full");

        let err = orbit
            .logs(&ResourceFilter {
                cluster: Some("broken".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        failing.assert_async().await;
        assert_eq!(err.to_string(), "index unavailable");
    }

    #[tokio::test]
    async fn correlated_alerts_prefer_named_field() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/alerts/correlated");
                then.status(200).json_body(json!({
                    "success": true,
                    "correlated_alerts": [{"id": "a1", "severity": "critical"}]
                }));
            })
            .await;
        let alerts = client(&server)
            .correlated_alerts(&ResourceFilter::default())
            .await
            .expect("alerts");
        assert_eq!(alerts[0]["id"], json!("a1"));
    }

    #[tokio::test]
    async fn http_errors_keep_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/ping");
                then.status(500).body("");
            })
            .await;
        let err = client(&server).ping().await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(err.to_string().contains("Ping failed"));
    }

    #[tokio::test]
    async fn query_posts_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/orbit/query").json_body(json!({
                    "query": "why is checkout slow",
                    "application": "checkout",
                    "time_range": "1h",
                    "query_type": "rca"
                }));
                then.status(200).json_body(json!({"answer": "db latency"}));
            })
            .await;
        let reply = client(&server)
            .query(&OrbitQuery {
                query: "why is checkout slow".into(),
                application: "checkout".into(),
                time_range: "1h".into(),
                query_type: "rca".into(),
            })
            .await
            .expect("query");
        mock.assert_async().await;
        assert_eq!(reply["answer"], json!("db latency"));
    }
}
