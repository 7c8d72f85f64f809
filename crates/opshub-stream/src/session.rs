//! Lifecycle of one submitted question: open the stream, fold events into the
//! active session, finalize into history.
//!
//! At most one session streams at a time. Every mutation is tagged with the
//! generation that started it; once [`SessionController::abandon`] or a newer
//! submission bumps the generation, the old stream stops without touching
//! state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use opshub_core::{NlqConfig, RequestStyle};
use opshub_events::Bus;
use opshub_protocol::{
    EventKind, HistoryStatus, QueryHistoryEntry, Row, StreamEvent, StreamQueryRequest,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::accumulator::{Ingest, ResultAccumulator};
use crate::decoder::{decode_frames, ByteStream};
use crate::error::{SessionError, TransportError};
use crate::history::{HistoryStats, QueryHistory};
use crate::normalize::{execution_time_from_data, parse_frame};

pub const ENDED_EARLY: &str = "stream ended before completion";
const DEFAULT_ERROR: &str = "query failed";

/// Opens the streaming response for a query.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn open(&self, request: &StreamQueryRequest) -> Result<ByteStream, TransportError>;
}

#[async_trait]
impl<T: EventSource + ?Sized> EventSource for Arc<T> {
    async fn open(&self, request: &StreamQueryRequest) -> Result<ByteStream, TransportError> {
        (**self).open(request).await
    }
}

/// Model and database selection in effect for submitted questions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionConfig {
    pub model: String,
    pub api_base: String,
    pub database: String,
    pub request_style: RequestStyle,
    #[serde(skip)]
    pub idle_timeout: Option<Duration>,
}

impl SessionConfig {
    /// Apply explicit choices over the configured defaults and check them
    /// against the model and database tables.
    pub fn resolve(
        cfg: &NlqConfig,
        model: Option<&str>,
        api_base: Option<&str>,
        database: Option<&str>,
    ) -> Result<Self, SessionError> {
        let model = non_blank(model).unwrap_or(cfg.default_model.as_str());
        if model.trim().is_empty() {
            return Err(SessionError::InvalidSelection("no model selected".into()));
        }
        let api_base = non_blank(api_base)
            .or_else(|| cfg.api_base_for(model))
            .ok_or_else(|| {
                SessionError::InvalidSelection(format!(
                    "unknown model `{model}` and no api base given"
                ))
            })?;
        let database = non_blank(database).unwrap_or(cfg.default_database.as_str());
        if cfg.host_for(database).is_none() {
            return Err(SessionError::InvalidSelection(format!(
                "unknown database `{database}`"
            )));
        }
        Ok(Self {
            model: model.to_string(),
            api_base: api_base.to_string(),
            database: database.to_string(),
            request_style: cfg.request_style,
            idle_timeout: cfg.idle_timeout(),
        })
    }

    pub fn build_request(&self, question: &str) -> StreamQueryRequest {
        match self.request_style {
            RequestStyle::Current => StreamQueryRequest::Current {
                question: question.to_string(),
                selected_llm_model: self.model.clone(),
                selected_llm_api_base: Some(self.api_base.clone()),
            },
            RequestStyle::Legacy => StreamQueryRequest::Legacy {
                question: question.to_string(),
                database: self.database.clone(),
                model: self.model.clone(),
                api_base: Some(self.api_base.clone()),
            },
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Streaming,
    Completed,
    Failed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Streaming => "streaming",
            SessionPhase::Completed => "completed",
            SessionPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Failed)
    }
}

/// State of the question currently on screen.
#[derive(Debug, Clone)]
pub struct QuerySession {
    pub id: String,
    pub question: String,
    pub model: String,
    pub database: String,
    pub phase: SessionPhase,
    pub sql: Option<String>,
    pub current_event: Option<StreamEvent>,
    pub execution_time: Option<f64>,
    pub error: Option<String>,
    pub results: ResultAccumulator,
}

impl QuerySession {
    fn new(question: &str, config: &SessionConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            question: question.to_string(),
            model: config.model.clone(),
            database: config.database.clone(),
            phase: SessionPhase::Streaming,
            sql: None,
            current_event: None,
            execution_time: None,
            error: None,
            results: ResultAccumulator::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed { execution_time: Option<f64> },
    Failed { message: String },
    /// Superseded by `abandon` or a newer session; nothing was recorded.
    Abandoned,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::Completed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub generation: u64,
    pub outcome: SessionOutcome,
    /// History entry written at the terminal transition.
    pub entry: Option<QueryHistoryEntry>,
}

/// Render-ready copy of the active session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub question: Option<String>,
    pub sql: Option<String>,
    pub rows: Vec<Row>,
    pub returned_rows: usize,
    pub total_rows: u64,
    pub opaque: Option<String>,
    pub current_event: Option<StreamEvent>,
    pub execution_time: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct ControllerState {
    generation: u64,
    session: Option<QuerySession>,
    history: QueryHistory,
}

impl ControllerState {
    fn phase(&self) -> SessionPhase {
        self.session
            .as_ref()
            .map(|s| s.phase)
            .unwrap_or(SessionPhase::Idle)
    }

    /// Active session, only if `generation` still owns it.
    fn owned(&mut self, generation: u64) -> Option<&mut QuerySession> {
        if self.generation != generation {
            return None;
        }
        self.session.as_mut()
    }
}

pub struct SessionController<S> {
    source: Arc<S>,
    config: SessionConfig,
    state: Arc<Mutex<ControllerState>>,
    bus: Bus,
}

impl<S> Clone for SessionController<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
            bus: self.bus.clone(),
        }
    }
}

impl<S: EventSource> SessionController<S> {
    pub fn new(source: S, config: SessionConfig, bus: Bus) -> Self {
        Self {
            source: Arc::new(source),
            config,
            state: Arc::new(Mutex::new(ControllerState::default())),
            bus,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Run one question to a terminal state.
    ///
    /// Rejected up front when the question is blank or another session is
    /// streaming; in both cases the existing state is left as it was.
    pub async fn submit(&self, question: &str) -> Result<SessionReport, SessionError> {
        if question.trim().is_empty() {
            return Err(SessionError::EmptyQuestion);
        }
        let generation = self.begin(question)?;
        let request = self.config.build_request(question);
        let (outcome, entry) = self.drive(generation, &request).await;
        Ok(SessionReport {
            generation,
            outcome,
            entry,
        })
    }

    fn begin(&self, question: &str) -> Result<u64, SessionError> {
        let mut st = self.state.lock();
        if st.phase() == SessionPhase::Streaming {
            debug!("submit ignored: a session is streaming");
            return Err(SessionError::Busy);
        }
        st.generation += 1;
        let session = QuerySession::new(question, &self.config);
        info!(
            generation = st.generation,
            session = %session.id,
            model = %self.config.model,
            database = %self.config.database,
            "session started"
        );
        self.bus.publish(
            opshub_topics::TOPIC_SESSION_STARTED,
            &json!({
                "id": session.id,
                "question": session.question,
                "model": session.model,
                "database": session.database,
            }),
        );
        st.session = Some(session);
        Ok(st.generation)
    }

    async fn drive(
        &self,
        generation: u64,
        request: &StreamQueryRequest,
    ) -> (SessionOutcome, Option<QueryHistoryEntry>) {
        let body = match self.source.open(request).await {
            Ok(body) => body,
            Err(err) => return self.fail(generation, err.to_string()),
        };
        let mut frames = decode_frames(body, self.config.idle_timeout);
        while let Some(frame) = frames.next().await {
            if !self.is_current(generation) {
                debug!(generation, "stale stream dropped");
                return (SessionOutcome::Abandoned, None);
            }
            let text = match frame {
                Ok(text) => text,
                Err(err) => return self.fail(generation, err.to_string()),
            };
            let event = match parse_frame(&text) {
                Ok(event) => event,
                Err(err) => {
                    warn!(%err, frame = %text, "skipping malformed frame");
                    continue;
                }
            };
            if let Some(done) = self.apply(generation, event) {
                return done;
            }
        }
        if !self.is_current(generation) {
            return (SessionOutcome::Abandoned, None);
        }
        self.fail(generation, ENDED_EARLY.to_string())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }

    /// Fold one event into the session. Returns the outcome once terminal.
    fn apply(
        &self,
        generation: u64,
        event: StreamEvent,
    ) -> Option<(SessionOutcome, Option<QueryHistoryEntry>)> {
        let mut st = self.state.lock();
        let Some(session) = st.owned(generation) else {
            return Some((SessionOutcome::Abandoned, None));
        };
        debug!(kind = event.kind.as_str(), "stream event");
        match &event.kind {
            EventKind::Status => {
                self.bus.publish(
                    opshub_topics::TOPIC_SESSION_STATUS,
                    &json!({"id": session.id, "message": event.message}),
                );
                session.current_event = Some(event);
            }
            EventKind::Sql => {
                session.results.reset();
                session.sql = event.sql_text().map(str::to_string);
                self.bus.publish(
                    opshub_topics::TOPIC_SESSION_SQL,
                    &json!({"id": session.id, "sql": session.sql}),
                );
                session.current_event = Some(event);
            }
            EventKind::Result => {
                let ingest = session.results.ingest_event(&event);
                let added = match ingest {
                    Ingest::Appended { added } => added,
                    Ingest::Opaque | Ingest::Empty => 0,
                };
                self.bus.publish(
                    opshub_topics::TOPIC_SESSION_RESULT,
                    &json!({
                        "id": session.id,
                        "added": added,
                        "opaque": ingest == Ingest::Opaque,
                        "returned_rows": session.results.returned_rows(),
                        "total_rows": session.results.total_rows(),
                    }),
                );
                session.current_event = Some(event);
            }
            EventKind::Complete => {
                let execution_time = event
                    .execution_time
                    .or_else(|| execution_time_from_data(event.data.as_ref()));
                session.phase = SessionPhase::Completed;
                session.execution_time = execution_time;
                session.current_event = Some(event);
                let (id, question, sql) =
                    (session.id.clone(), session.question.clone(), session.sql.clone());
                let returned = session.results.returned_rows();
                let entry = st.history.record(
                    &question,
                    sql.as_deref(),
                    HistoryStatus::Success,
                    execution_time,
                );
                info!(session = %id, returned, ?execution_time, "session completed");
                self.bus.publish(
                    opshub_topics::TOPIC_SESSION_COMPLETED,
                    &json!({"id": id, "execution_time": execution_time, "returned_rows": returned}),
                );
                self.bus
                    .publish(opshub_topics::TOPIC_HISTORY_APPENDED, &entry);
                return Some((SessionOutcome::Completed { execution_time }, Some(entry)));
            }
            EventKind::Error => {
                let message = event
                    .message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .or_else(|| {
                        event
                            .data
                            .as_ref()
                            .and_then(|d| d.as_str())
                            .map(str::to_string)
                    })
                    .unwrap_or_else(|| DEFAULT_ERROR.to_string());
                session.current_event = Some(event);
                drop(st);
                return Some(self.fail(generation, message));
            }
            EventKind::Other(kind) => {
                debug!(kind = %kind, "unrecognized event kind; kept as current event");
                session.current_event = Some(event);
            }
        }
        self.bus
            .publish(opshub_topics::TOPIC_SESSION_EVENT, &json!({"generation": generation}));
        None
    }

    /// Terminal failure; partial rows and SQL stay on the session.
    fn fail(
        &self,
        generation: u64,
        message: String,
    ) -> (SessionOutcome, Option<QueryHistoryEntry>) {
        let mut st = self.state.lock();
        let Some(session) = st.owned(generation) else {
            return (SessionOutcome::Abandoned, None);
        };
        session.phase = SessionPhase::Failed;
        session.error = Some(message.clone());
        let (id, question, sql) = (session.id.clone(), session.question.clone(), session.sql.clone());
        let entry = st
            .history
            .record(&question, sql.as_deref(), HistoryStatus::Error, None);
        warn!(session = %id, error = %message, "session failed");
        self.bus.publish(
            opshub_topics::TOPIC_SESSION_FAILED,
            &json!({"id": id, "message": message}),
        );
        self.bus
            .publish(opshub_topics::TOPIC_HISTORY_APPENDED, &entry);
        (SessionOutcome::Failed { message }, Some(entry))
    }

    /// Drop the active session and return to idle. A stream still running
    /// for it stops at its next event.
    pub fn abandon(&self) {
        let mut st = self.state.lock();
        st.generation += 1;
        if let Some(session) = st.session.take() {
            info!(session = %session.id, phase = session.phase.as_str(), "session abandoned");
            self.bus.publish(
                opshub_topics::TOPIC_SESSION_ABANDONED,
                &json!({"id": session.id}),
            );
        }
    }

    pub fn clear_history(&self) {
        let mut st = self.state.lock();
        st.history.clear();
        if let Some(session) = st.session.as_mut() {
            if session.phase != SessionPhase::Streaming {
                session.current_event = None;
            }
        }
        self.bus
            .publish(opshub_topics::TOPIC_HISTORY_CLEARED, &json!({}));
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let st = self.state.lock();
        match st.session.as_ref() {
            Some(s) => SessionSnapshot {
                phase: s.phase,
                question: Some(s.question.clone()),
                sql: s.sql.clone(),
                rows: s.results.rows().to_vec(),
                returned_rows: s.results.returned_rows(),
                total_rows: s.results.total_rows(),
                opaque: s.results.opaque().map(str::to_string),
                current_event: s.current_event.clone(),
                execution_time: s.execution_time,
                error: s.error.clone(),
            },
            None => SessionSnapshot {
                phase: SessionPhase::Idle,
                question: None,
                sql: None,
                rows: Vec::new(),
                returned_rows: 0,
                total_rows: 0,
                opaque: None,
                current_event: None,
                execution_time: None,
                error: None,
            },
        }
    }

    /// Borrow the active rows without copying them.
    pub fn with_rows<T>(&self, f: impl FnOnce(&[Row]) -> T) -> T {
        let st = self.state.lock();
        let rows = st.session.as_ref().map(|s| s.results.rows()).unwrap_or(&[]);
        f(rows)
    }

    pub fn history(&self) -> Vec<QueryHistoryEntry> {
        self.state.lock().history.entries().to_vec()
    }

    pub fn history_stats(&self, n: usize) -> Option<HistoryStats> {
        HistoryStats::last_n(&self.state.lock().history, n)
    }
}
