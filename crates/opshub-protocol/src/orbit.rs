use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Optional scoping shared by the metrics, logs and alerts endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

impl ResourceFilter {
    /// Query pairs for the non-empty fields, in a stable order.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        let fields = [
            ("cluster", &self.cluster),
            ("namespace", &self.namespace),
            ("application", &self.application),
            ("severity", &self.severity),
        ];
        for (key, value) in fields {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                out.push((key, v.to_string()));
            }
        }
        out
    }
}

/// Body of `POST /orbit/query`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrbitQuery {
    pub query: String,
    pub application: String,
    pub time_range: String,
    pub query_type: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    /// Inbound plus outbound.
    pub network: f64,
    pub response_time: f64,
    pub error_rate: f64,
    #[serde(default)]
    pub raw: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub severity: String,
    pub message: String,
    pub source: String,
    pub stack_trace: String,
    pub logger: String,
    pub application_name: String,
    pub app_version: String,
    pub domain_name: String,
    #[serde(default)]
    pub raw: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_skips_blank_fields() {
        let filter = ResourceFilter {
            cluster: Some("prod".into()),
            namespace: Some("  ".into()),
            application: None,
            severity: Some("ERROR".into()),
        };
        assert_eq!(
            filter.query_pairs(),
            vec![("cluster", "prod".to_string()), ("severity", "ERROR".to_string())]
        );
    }
}
