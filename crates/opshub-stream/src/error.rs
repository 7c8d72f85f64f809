use std::time::Duration;

/// Failures of the streaming request itself. Each one ends the session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("connecting to {url}: {message}")]
    Connect { url: String, message: String },
    #[error("query stream failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("query stream returned no body")]
    MissingBody,
    #[error("reading query stream: {0}")]
    Body(String),
    #[error("query stream stalled: no data for {}s", .after.as_secs_f64())]
    Stalled { after: Duration },
}

/// A single frame that could not be turned into an event. The frame is
/// skipped and the session carries on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("frame is not valid JSON: {0}")]
    Json(String),
    #[error("frame payload is not a JSON object")]
    NotAnObject,
    #[error("frame payload has neither `type` nor `event`")]
    MissingKind,
}

/// Submissions rejected before any request is issued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("question is empty")]
    EmptyQuestion,
    #[error("a query is already streaming")]
    Busy,
    #[error("invalid selection: {0}")]
    InvalidSelection(String),
}
