//! Maps the backend's event envelopes onto [`StreamEvent`].
//!
//! Two grammars are accepted:
//! - typed: `{"type": "sql", "data": ..., "message": ..., "execution_time": ...}`
//! - legacy: `{"event": "sql", "data": ..., "message": ...}` where the elapsed
//!   time may only be present as `data.execution_time_ms`.

use opshub_protocol::{EventKind, StreamEvent};
use serde::Deserialize;
use serde_json::Value;

use crate::error::NormalizeError;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEnvelope {
    Typed {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        data: Option<Value>,
        #[serde(default)]
        message: Option<Value>,
        #[serde(default)]
        execution_time: Option<Value>,
    },
    Legacy {
        event: String,
        #[serde(default)]
        data: Option<Value>,
        #[serde(default)]
        message: Option<Value>,
        #[serde(default)]
        execution_time: Option<Value>,
    },
}

impl RawEnvelope {
    fn into_event(self) -> StreamEvent {
        match self {
            RawEnvelope::Typed {
                kind,
                data,
                message,
                execution_time,
            } => StreamEvent {
                kind: EventKind::from_slug(&kind),
                data,
                message: message.and_then(message_text),
                execution_time: execution_time.as_ref().and_then(number),
            },
            RawEnvelope::Legacy {
                event,
                data,
                message,
                execution_time,
            } => {
                let direct = execution_time.as_ref().and_then(number);
                let execution_time = direct.or_else(|| execution_time_from_data(data.as_ref()));
                StreamEvent {
                    kind: EventKind::from_slug(&event),
                    data,
                    message: message.and_then(message_text),
                    execution_time,
                }
            }
        }
    }
}

/// Normalize one decoded frame payload.
pub fn normalize(payload: &Value) -> Result<StreamEvent, NormalizeError> {
    let obj = payload.as_object().ok_or(NormalizeError::NotAnObject)?;
    // an empty `type` defers to `event`, matching how older servers pad the envelope
    let typed_blank = obj
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(str::is_empty);
    if typed_blank {
        if let Some(event) = obj.get("event").and_then(Value::as_str) {
            let raw = RawEnvelope::Legacy {
                event: event.to_string(),
                data: obj.get("data").cloned(),
                message: obj.get("message").cloned(),
                execution_time: obj.get("execution_time").cloned(),
            };
            return Ok(raw.into_event());
        }
    }
    let raw = RawEnvelope::deserialize(payload).map_err(|_| NormalizeError::MissingKind)?;
    Ok(raw.into_event())
}

/// Decode and normalize the text of a single frame.
pub fn parse_frame(text: &str) -> Result<StreamEvent, NormalizeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| NormalizeError::Json(e.to_string()))?;
    normalize(&value)
}

/// Seconds derived from a `complete` payload: `execution_time_ms / 1000`,
/// else `execution_time`. A present `execution_time_ms` of 0 counts as 0s.
pub fn execution_time_from_data(data: Option<&Value>) -> Option<f64> {
    let data = data?;
    if let Some(ms) = data.get("execution_time_ms").and_then(number) {
        return Some(ms / 1000.0);
    }
    data.get("execution_time").and_then(number)
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn message_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
