//! Wire and data types shared by the stream core, the HTTP clients and the CLI.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

mod metabase;
mod nlq;
mod orbit;

pub use metabase::{DashboardRequest, DashboardResponse, MetabaseHealth};
pub use nlq::{DatabaseHealth, ExampleQuery, NlqHealth, SetDatabaseRequest, StreamQueryRequest};
pub use orbit::{LogRecord, MetricsSnapshot, OrbitQuery, ResourceFilter};

/// One tabular result row: column name to scalar value, in backend column order.
pub type Row = Map<String, Value>;

/// Canonical kind of a normalized stream event.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Status,
    Sql,
    Result,
    Complete,
    Error,
    /// Kinds outside the canonical set, carried verbatim.
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Status => "status",
            EventKind::Sql => "sql",
            EventKind::Result => "result",
            EventKind::Complete => "complete",
            EventKind::Error => "error",
            EventKind::Other(raw) => raw.as_str(),
        }
    }

    pub fn from_slug(value: &str) -> Self {
        match value {
            "status" => EventKind::Status,
            "sql" => EventKind::Sql,
            "result" => EventKind::Result,
            "complete" => EventKind::Complete,
            "error" => EventKind::Error,
            other => EventKind::Other(other.to_string()),
        }
    }

    /// `complete` and `error` end a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::Complete | EventKind::Error)
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        EventKind::from_slug(&value)
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Stream event after normalization, whatever envelope the backend used.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Elapsed seconds, set on `complete` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
}

impl StreamEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            data: None,
            message: None,
            execution_time: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Generated query text carried by a `sql` event.
    pub fn sql_text(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Success,
    Error,
}

impl HistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryStatus::Success => "success",
            HistoryStatus::Error => "error",
        }
    }
}

/// Summary of one finished session. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QueryHistoryEntry {
    pub id: String,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    /// RFC3339 UTC.
    pub timestamp: String,
    pub status: HistoryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_kind_round_trips_known_and_unknown_slugs() {
        assert_eq!(EventKind::from_slug("sql"), EventKind::Sql);
        assert_eq!(EventKind::from_slug("complete").as_str(), "complete");
        let other = EventKind::from_slug("heartbeat");
        assert_eq!(other, EventKind::Other("heartbeat".into()));
        assert_eq!(other.as_str(), "heartbeat");
        assert!(!other.is_terminal());
        assert!(EventKind::Error.is_terminal());
    }

    #[test]
    fn stream_event_serializes_type_field() {
        let ev = StreamEvent::new(EventKind::Sql).with_data(json!("SELECT 1"));
        let value = serde_json::to_value(&ev).expect("serialize event");
        assert_eq!(value, json!({"type": "sql", "data": "SELECT 1"}));
        assert_eq!(ev.sql_text(), Some("SELECT 1"));
    }

    #[test]
    fn history_entry_omits_missing_fields() {
        let entry = QueryHistoryEntry {
            id: "1".into(),
            question: "q".into(),
            sql: None,
            timestamp: "2025-01-01T00:00:00Z".into(),
            status: HistoryStatus::Error,
            execution_time: None,
        };
        let value = serde_json::to_value(&entry).expect("serialize entry");
        assert_eq!(value.get("status"), Some(&json!("error")));
        assert!(value.get("sql").is_none());
    }
}
