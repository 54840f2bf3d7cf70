//! Conversation event logger.
//!
//! Structured events (turn completed, state updated, validation, failures) emitted
//! through `tracing` under the `chat_events` target, redacted first.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::redact::redact_sensitive_data;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    Initialized {
        message_count: usize,
        rebuilt_state: bool,
    },
    TurnCompleted {
        kind: String,
        interaction_count: u64,
        response_chars: usize,
    },
    StateUpdated {
        projects_added: usize,
        topics_added: usize,
    },
    ContextValidated {
        corrections_applied: usize,
    },
    SessionSaved {
        session_id: String,
        message_count: usize,
    },
    SessionLoaded {
        session_id: String,
        message_count: usize,
    },
    TurnFailed {
        error_msg: String,
    },
}

#[derive(Debug, Serialize)]
pub struct EventLogEntry {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: ConversationEvent,
}

pub struct EventLogger;

impl EventLogger {
    /// Log a conversation event, scrubbing free-text fields.
    pub fn log_event(user_id: &str, mut event: ConversationEvent) {
        if let ConversationEvent::TurnFailed { error_msg } = &mut event {
            *error_msg = redact_sensitive_data(error_msg);
        }

        let failed = matches!(event, ConversationEvent::TurnFailed { .. });
        let entry = EventLogEntry {
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
            event,
        };

        let json = serde_json::to_string(&entry).unwrap_or_else(|_| format!("{:?}", entry));
        if failed {
            warn!(target: "chat_events", event = %json, "Conversation event");
        } else {
            info!(target: "chat_events", event = %json, "Conversation event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_tag() {
        let entry = EventLogEntry {
            user_id: "u1".into(),
            timestamp: Utc::now(),
            event: ConversationEvent::TurnCompleted {
                kind: "text".into(),
                interaction_count: 3,
                response_chars: 42,
            },
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["event"]["type"], "turn_completed");
        assert_eq!(json["event"]["interaction_count"], 3);
    }

    #[test]
    fn test_log_event_does_not_panic_without_subscriber() {
        EventLogger::log_event(
            "u1",
            ConversationEvent::TurnFailed {
                error_msg: "upstream said Bearer abc.def.ghi".into(),
            },
        );
    }
}
