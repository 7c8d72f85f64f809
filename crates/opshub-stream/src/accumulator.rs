//! Running row set for one query, fed by `result` events.

use opshub_protocol::{EventKind, Row, StreamEvent};
use serde_json::Value;

/// What a single `ingest` did to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    Appended { added: usize },
    /// Payload was not tabular; kept as text for direct display.
    Opaque,
    Empty,
}

#[derive(Debug, Default, Clone)]
pub struct ResultAccumulator {
    rows: Vec<Row>,
    reported_total: Option<u64>,
    opaque: Option<String>,
    pages: usize,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.rows.clear();
        self.reported_total = None;
        self.opaque = None;
        self.pages = 0;
    }

    /// Fold one `result` payload into the buffer.
    ///
    /// Accepts a JSON-encoded string, a bare row array, or a
    /// `{rows, total_rows}` envelope. Rows are appended in arrival order and
    /// repeated pages are kept as delivered.
    pub fn ingest(&mut self, payload: &Value) -> Ingest {
        match payload {
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(parsed @ (Value::Array(_) | Value::Object(_))) => self.ingest_structured(&parsed),
                Ok(_) | Err(_) => {
                    tracing::debug!(len = text.len(), "result payload kept as opaque text");
                    self.opaque = Some(text.clone());
                    Ingest::Opaque
                }
            },
            Value::Null => Ingest::Empty,
            other => self.ingest_structured(other),
        }
    }

    /// Ingest the payload of a `result` event; other kinds are ignored.
    pub fn ingest_event(&mut self, event: &StreamEvent) -> Ingest {
        match (&event.kind, event.data.as_ref()) {
            (EventKind::Result, Some(data)) => self.ingest(data),
            _ => Ingest::Empty,
        }
    }

    fn ingest_structured(&mut self, payload: &Value) -> Ingest {
        let rows = match payload {
            Value::Array(items) => Some(items),
            Value::Object(obj) => {
                if let Some(total) = obj.get("total_rows").and_then(total_value) {
                    self.reported_total = Some(total);
                }
                obj.get("rows").and_then(Value::as_array)
            }
            _ => None,
        };
        let Some(rows) = rows else {
            return Ingest::Empty;
        };
        let before = self.rows.len();
        for item in rows {
            match item {
                Value::Object(row) => self.rows.push(row.clone()),
                other => tracing::debug!(value = %other, "skipping non-object result row"),
            }
        }
        let added = self.rows.len() - before;
        if added == 0 {
            return Ingest::Empty;
        }
        self.pages += 1;
        Ingest::Appended { added }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn returned_rows(&self) -> usize {
        self.rows.len()
    }

    /// Latest total reported by the backend, else the buffer length.
    pub fn total_rows(&self) -> u64 {
        self.reported_total.unwrap_or(self.rows.len() as u64)
    }

    pub fn reported_total(&self) -> Option<u64> {
        self.reported_total
    }

    pub fn opaque(&self) -> Option<&str> {
        self.opaque.as_deref()
    }

    /// Number of `result` pages that contributed rows.
    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.opaque.is_none()
    }
}

fn total_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
