use chrono::{SecondsFormat, Utc};
use opshub_protocol::{HistoryStatus, QueryHistoryEntry};
use serde::Serialize;

/// In-memory log of finished sessions, most recent first.
#[derive(Debug, Default, Clone)]
pub struct QueryHistory {
    entries: Vec<QueryHistoryEntry>,
}

impl QueryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a new entry and return a copy of it.
    pub fn record(
        &mut self,
        question: &str,
        sql: Option<&str>,
        status: HistoryStatus,
        execution_time: Option<f64>,
    ) -> QueryHistoryEntry {
        let entry = QueryHistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            question: question.to_string(),
            sql: sql.filter(|s| !s.is_empty()).map(str::to_string),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            status,
            execution_time,
        };
        self.entries.insert(0, entry.clone());
        entry
    }

    pub fn entries(&self) -> &[QueryHistoryEntry] {
        &self.entries
    }

    pub fn latest(&self) -> Option<&QueryHistoryEntry> {
        self.entries.first()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Aggregates over the most recent entries, as fed to the analytics charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStats {
    pub considered: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Percent, 0..=100.
    pub success_rate: f64,
    /// Execution times of the considered entries that have one, oldest first.
    pub response_times: Vec<f64>,
}

impl HistoryStats {
    /// Stats over the newest `n` entries; `None` when history is empty.
    pub fn last_n(history: &QueryHistory, n: usize) -> Option<Self> {
        let recent: Vec<&QueryHistoryEntry> = history.entries().iter().take(n).collect();
        if recent.is_empty() {
            return None;
        }
        let success_count = recent
            .iter()
            .filter(|e| e.status == HistoryStatus::Success)
            .count();
        let considered = recent.len();
        let response_times = recent
            .iter()
            .rev()
            .filter_map(|e| e.execution_time)
            .collect();
        Some(Self {
            considered,
            success_count,
            failure_count: considered - success_count,
            success_rate: success_count as f64 * 100.0 / considered as f64,
            response_times,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_prepends_and_fills_metadata() {
        let mut history = QueryHistory::new();
        history.record("first", Some("SELECT 1"), HistoryStatus::Success, Some(0.5));
        let second = history.record("second", None, HistoryStatus::Error, None);
        assert_eq!(history.len(), 2);
        assert_eq!(history.entries()[0].question, "second");
        assert_eq!(history.latest().map(|e| e.id.as_str()), Some(second.id.as_str()));
        assert_eq!(history.entries()[1].sql.as_deref(), Some("SELECT 1"));
        assert!(second.timestamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&second.timestamp).is_ok());
        assert_ne!(history.entries()[0].id, history.entries()[1].id);
    }

    #[test]
    fn empty_sql_is_not_stored() {
        let mut history = QueryHistory::new();
        let entry = history.record("q", Some(""), HistoryStatus::Error, None);
        assert_eq!(entry.sql, None);
    }

    #[test]
    fn clear_empties_history() {
        let mut history = QueryHistory::new();
        history.record("q", None, HistoryStatus::Success, None);
        history.clear();
        assert!(history.is_empty());
        assert!(HistoryStats::last_n(&history, 10).is_none());
    }

    #[test]
    fn stats_cover_only_recent_entries() {
        let mut history = QueryHistory::new();
        // oldest: failure outside the window
        history.record("old", None, HistoryStatus::Error, None);
        history.record("a", None, HistoryStatus::Success, Some(1.0));
        history.record("b", None, HistoryStatus::Error, None);
        history.record("c", None, HistoryStatus::Success, Some(3.0));
        history.record("d", None, HistoryStatus::Success, Some(2.0));
        let stats = HistoryStats::last_n(&history, 4).expect("stats");
        assert_eq!(stats.considered, 4);
        assert_eq!(stats.success_count, 3);
        assert_eq!(stats.failure_count, 1);
        assert!((stats.success_rate - 75.0).abs() < f64::EPSILON);
        assert_eq!(stats.response_times, vec![1.0, 3.0, 2.0]);
    }
}
