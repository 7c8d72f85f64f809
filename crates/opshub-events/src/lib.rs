//! In-process observer bus for query session updates.
//!
//! Controllers publish one [`Envelope`] per lifecycle step; renderers subscribe
//! and pick the topics they care about (see `opshub-topics`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// One published update. `time` is RFC3339 UTC with millisecond precision.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Envelope {
    pub time: String,
    pub kind: String,
    pub payload: Value,
}

impl Envelope {
    /// True when `kind` is `prefix` itself or sits under it (`nlq.session` matches
    /// `nlq.session.sql`, not `nlq.sessionx`).
    pub fn is_under(&self, prefix: &str) -> bool {
        match self.kind.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('.'),
            None => false,
        }
    }

    /// String field of an object payload.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }
}

/// Fan-out of session updates to any number of observers.
///
/// Publishing never blocks. An observer that falls more than `capacity`
/// updates behind sees `Lagged` and resumes from the oldest retained one.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Envelope>,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Stamp and broadcast `payload` under `kind`. Returns how many observers
    /// were listening.
    pub fn publish<T: Serialize>(&self, kind: &str, payload: &T) -> usize {
        let payload = serde_json::to_value(payload).unwrap_or_else(|err| {
            tracing::warn!(kind, %err, "dropping unserializable bus payload");
            Value::Null
        });
        let envelope = Envelope {
            time: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            kind: kind.to_string(),
            payload,
        };
        self.tx.send(envelope).unwrap_or(0)
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_published_envelopes() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        assert_eq!(
            bus.publish("nlq.session.status", &json!({"message": "thinking"})),
            1
        );
        let env = rx.recv().await.expect("envelope");
        assert_eq!(env.kind, "nlq.session.status");
        assert_eq!(env.text("message"), Some("thinking"));
        assert!(env.time.ends_with('Z'));
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = Bus::default();
        assert_eq!(bus.receiver_count(), 0);
        assert_eq!(bus.publish("nlq.session.sql", &"SELECT 1"), 0);
    }

    #[test]
    fn prefix_match_respects_segments() {
        let env = Envelope {
            time: String::new(),
            kind: "nlq.session.sql".into(),
            payload: json!("SELECT 1"),
        };
        assert!(env.is_under("nlq.session"));
        assert!(env.is_under("nlq.session.sql"));
        assert!(!env.is_under("nlq.sess"));
        assert!(!env.is_under("nlq.history"));
        assert_eq!(env.text("sql"), None);
    }
}
