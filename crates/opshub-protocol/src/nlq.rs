use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Body of `POST /query/stream` (and the non-streaming `/query`).
///
/// Older deployments expect the legacy field names.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamQueryRequest {
    Current {
        question: String,
        selected_llm_model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selected_llm_api_base: Option<String>,
    },
    Legacy {
        question: String,
        database: String,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_base: Option<String>,
    },
}

impl StreamQueryRequest {
    pub fn question(&self) -> &str {
        match self {
            StreamQueryRequest::Current { question, .. } => question,
            StreamQueryRequest::Legacy { question, .. } => question,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            StreamQueryRequest::Current {
                selected_llm_model, ..
            } => selected_llm_model,
            StreamQueryRequest::Legacy { model, .. } => model,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetDatabaseRequest {
    pub database: String,
    pub host: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DatabaseHealth {
    #[serde(default)]
    pub clickhouse: String,
    #[serde(default)]
    pub current_host: String,
}

/// `GET /health` reply from the NLQ service.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NlqHealth {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub databases: DatabaseHealth,
    #[serde(default)]
    pub llm_model: String,
    #[serde(default)]
    pub llm: bool,
    #[serde(default)]
    pub real_time: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExampleQuery {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub queries: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn current_request_uses_selected_llm_fields() {
        let req = StreamQueryRequest::Current {
            question: "top users".into(),
            selected_llm_model: "mistral12b".into(),
            selected_llm_api_base: Some("http://llm/v1".into()),
        };
        assert_eq!(
            serde_json::to_value(&req).expect("serialize"),
            json!({
                "question": "top users",
                "selected_llm_model": "mistral12b",
                "selected_llm_api_base": "http://llm/v1"
            })
        );
    }

    #[test]
    fn legacy_request_uses_database_and_model() {
        let req = StreamQueryRequest::Legacy {
            question: "q".into(),
            database: "p43_eng_sjc01".into(),
            model: "phi".into(),
            api_base: None,
        };
        let value = serde_json::to_value(&req).expect("serialize");
        assert_eq!(value.get("database"), Some(&json!("p43_eng_sjc01")));
        assert!(value.get("api_base").is_none());
        assert_eq!(req.model(), "phi");
    }

    #[test]
    fn health_tolerates_partial_payloads() {
        let health: NlqHealth =
            serde_json::from_value(json!({"status": "ok", "llm": true})).expect("decode");
        assert_eq!(health.status, "ok");
        assert!(health.llm);
        assert!(health.databases.current_host.is_empty());
    }
}
