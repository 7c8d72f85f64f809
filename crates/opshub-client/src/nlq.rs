use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use opshub_core::NlqConfig;
use opshub_protocol::{ExampleQuery, NlqHealth, SetDatabaseRequest, StreamQueryRequest};
use opshub_stream::{ByteStream, EventSource, TransportError};
use serde_json::Value;

use crate::error::ClientError;
use crate::http::{build_client, error_detail, get_json, join_url, read_json, send_checked};
use crate::shape::coerce_list;

/// Client for the natural-language-to-SQL service.
#[derive(Clone)]
pub struct NlqClient {
    config: NlqConfig,
    http: reqwest::Client,
    stream_http: reqwest::Client,
}

impl NlqClient {
    pub fn new(config: NlqConfig, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            config,
            http: build_client(Some(timeout))?,
            // streams run as long as the backend keeps talking; idle time is
            // bounded by the decoder instead
            stream_http: build_client(None)?,
        })
    }

    pub fn config(&self) -> &NlqConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.config.base_url, path)
    }

    pub async fn health(&self) -> Result<NlqHealth, ClientError> {
        get_json(&self.http, &self.url("/health"), &[], "Health check failed").await
    }

    /// Point the service at another ClickHouse pod. Unknown pods are rejected
    /// without a request.
    pub async fn set_database(&self, pod: &str) -> Result<SetDatabaseRequest, ClientError> {
        let host = self
            .config
            .host_for(pod)
            .ok_or_else(|| ClientError::InvalidSelection(format!("unknown database pod `{pod}`")))?;
        let body = SetDatabaseRequest {
            database: pod.to_string(),
            host: host.to_string(),
        };
        let url = self.url("/set_database");
        send_checked(
            self.http.post(&url).json(&body),
            &url,
            "Failed to set database",
        )
        .await?;
        tracing::info!(database = pod, host, "database switched");
        Ok(body)
    }

    pub async fn examples(&self) -> Result<Vec<ExampleQuery>, ClientError> {
        let url = self.url("/examples");
        let raw: Value = get_json(&self.http, &url, &[], "Failed to fetch examples").await?;
        coerce_list(raw, &["examples", "data", "items"])
            .into_iter()
            .map(|item| {
                serde_json::from_value(item).map_err(|e| ClientError::Decode {
                    url: url.clone(),
                    message: e.to_string(),
                })
            })
            .collect()
    }

    /// Resolve the api base for a model: explicit value first, then the
    /// configured model table.
    pub fn api_base_for(&self, model: &str, explicit: Option<&str>) -> Result<String, ClientError> {
        explicit
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| self.config.api_base_for(model))
            .map(str::to_string)
            .ok_or_else(|| {
                ClientError::InvalidSelection(format!(
                    "unknown model `{model}` and no api base given"
                ))
            })
    }

    /// Non-streaming `POST /query`.
    pub async fn query(
        &self,
        question: &str,
        model: &str,
        api_base: Option<&str>,
    ) -> Result<Value, ClientError> {
        let api_base = self.api_base_for(model, api_base)?;
        let body = StreamQueryRequest::Current {
            question: question.to_string(),
            selected_llm_model: model.to_string(),
            selected_llm_api_base: Some(api_base),
        };
        let url = self.url("/query");
        let resp = send_checked(self.http.post(&url).json(&body), &url, "Query failed").await?;
        read_json(resp, &url).await
    }
}

#[async_trait]
impl EventSource for NlqClient {
    async fn open(&self, request: &StreamQueryRequest) -> Result<ByteStream, TransportError> {
        let url = self.url("/query/stream");
        tracing::debug!(%url, model = request.model(), "opening query stream");
        let resp = self
            .stream_http
            .post(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Connect {
                url: url.clone(),
                message: e.to_string(),
            })?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: error_detail(&text).unwrap_or_else(|| "Failed to start query".to_string()),
            });
        }
        if resp.content_length() == Some(0) {
            return Err(TransportError::MissingBody);
        }
        Ok(resp
            .bytes_stream()
            .map_err(|e| TransportError::Body(e.to_string()))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use opshub_events::Bus;
    use opshub_stream::{SessionConfig, SessionController, SessionOutcome};
    use serde_json::json;

    fn client(server: &MockServer) -> NlqClient {
        let config = NlqConfig {
            base_url: server.base_url(),
            ..NlqConfig::default()
        };
        NlqClient::new(config, Duration::from_secs(5)).expect("client")
    }

    #[tokio::test]
    async fn health_decodes_partial_reply() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(200).json_body(json!({
                    "status": "healthy",
                    "databases": {"clickhouse": "connected", "current_host": "ch01"},
                    "llm": true
                }));
            })
            .await;
        let health = client(&server).health().await.expect("health");
        mock.assert_async().await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.databases.current_host, "ch01");
        assert!(!health.real_time);
    }

    #[tokio::test]
    async fn set_database_posts_mapped_host() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/set_database").json_body(json!({
                    "database": "p05_eng_sjc01",
                    "host": "clickhouse11.p05.eng.sjc01.qualys.com"
                }));
                then.status(200).json_body(json!({"ok": true}));
            })
            .await;
        let applied = client(&server)
            .set_database("p05_eng_sjc01")
            .await
            .expect("set database");
        mock.assert_async().await;
        assert_eq!(applied.host, "clickhouse11.p05.eng.sjc01.qualys.com");
    }

    #[tokio::test]
    async fn set_database_rejects_unknown_pod_locally() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.path("/set_database");
                then.status(200);
            })
            .await;
        let err = client(&server).set_database("p99").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidSelection(_)));
        mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn examples_accept_wrapped_lists() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/examples");
                then.status(200).json_body(json!({
                    "examples": [{"category": "Users", "queries": ["top users"]}]
                }));
            })
            .await;
        let examples = client(&server).examples().await.expect("examples");
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].queries, vec!["top users".to_string()]);
    }

    #[tokio::test]
    async fn query_requires_known_model_or_base() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/query").json_body(json!({
                    "question": "count hosts",
                    "selected_llm_model": "custom",
                    "selected_llm_api_base": "http://llm/v1"
                }));
                then.status(200).json_body(json!({"sql": "SELECT count() FROM hosts"}));
            })
            .await;
        let nlq = client(&server);
        let err = nlq.query("count hosts", "custom", None).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidSelection(_)));
        let reply = nlq
            .query("count hosts", "custom", Some("http://llm/v1"))
            .await
            .expect("query");
        mock.assert_async().await;
        assert_eq!(reply["sql"], json!("SELECT count() FROM hosts"));
    }

    #[tokio::test]
    async fn stream_status_error_is_transport_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/query/stream");
                then.status(503).json_body(json!({"detail": "model offline"}));
            })
            .await;
        let request = StreamQueryRequest::Current {
            question: "q".into(),
            selected_llm_model: "mistral12b".into(),
            selected_llm_api_base: None,
        };
        match client(&server).open(&request).await {
            Err(TransportError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "model offline");
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("expected a status error"),
        }
    }

    #[tokio::test]
    async fn session_streams_through_http() {
        let server = MockServer::start_async().await;
        let sse = concat!(
            "data: {\"event\":\"status\",\"message\":\"thinking\"}\n\n",
            "data: {\"event\":\"sql\",\"data\":\"SELECT user FROM users LIMIT 10\"}\n\n",
            "data: {\"event\":\"result\",\"data\":{\"rows\":[{\"user\":\"a\"}],\"total_rows\":1}}\n\n",
            "data: {\"event\":\"complete\",\"data\":{\"execution_time_ms\":900}}\n\n",
            "data: [DONE]\n\n",
        );
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/query/stream")
                    .json_body_partial(r#"{"question":"show top 10 users","selected_llm_model":"mistral12b"}"#);
                then.status(200)
                    .header("content-type", "text/event-stream")
                    .body(sse);
            })
            .await;
        let nlq = client(&server);
        let config = SessionConfig::resolve(nlq.config(), None, None, None).expect("config");
        let ctrl = SessionController::new(nlq, config, Bus::default());
        let report = ctrl.submit("show top 10 users").await.expect("submit");
        mock.assert_async().await;
        assert_eq!(
            report.outcome,
            SessionOutcome::Completed {
                execution_time: Some(0.9)
            }
        );
        let snap = ctrl.snapshot();
        assert_eq!(snap.sql.as_deref(), Some("SELECT user FROM users LIMIT 10"));
        assert_eq!(snap.returned_rows, 1);
    }
}
