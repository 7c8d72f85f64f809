//! Topic names published on the session bus.
//!
//! Keep this list alphabetized within sections and favor dot.case names.

// NLQ query sessions
pub const TOPIC_SESSION_ABANDONED: &str = "nlq.session.abandoned";
pub const TOPIC_SESSION_COMPLETED: &str = "nlq.session.completed";
pub const TOPIC_SESSION_EVENT: &str = "nlq.session.event";
pub const TOPIC_SESSION_FAILED: &str = "nlq.session.failed";
pub const TOPIC_SESSION_RESULT: &str = "nlq.session.result";
pub const TOPIC_SESSION_SQL: &str = "nlq.session.sql";
pub const TOPIC_SESSION_STARTED: &str = "nlq.session.started";
pub const TOPIC_SESSION_STATUS: &str = "nlq.session.status";

// History
pub const TOPIC_HISTORY_APPENDED: &str = "nlq.history.appended";
pub const TOPIC_HISTORY_CLEARED: &str = "nlq.history.cleared";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_topics_share_prefix() {
        for topic in [
            TOPIC_SESSION_ABANDONED,
            TOPIC_SESSION_COMPLETED,
            TOPIC_SESSION_EVENT,
            TOPIC_SESSION_FAILED,
            TOPIC_SESSION_RESULT,
            TOPIC_SESSION_SQL,
            TOPIC_SESSION_STARTED,
            TOPIC_SESSION_STATUS,
        ] {
            assert!(topic.starts_with("nlq.session."), "{topic}");
        }
    }
}
