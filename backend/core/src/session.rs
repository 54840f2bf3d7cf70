use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::ChatMessage;
use crate::state::ConversationState;

/// A durably persisted conversation owned by a single user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub session_id: String,
    pub user_id: String,
    /// Saved without the leading system message; the prompt lives in `state.system_prompt`.
    pub messages: Vec<ChatMessage>,
    pub state: ConversationState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(
        session_id: Option<String>,
        user_id: impl Into<String>,
        messages: Vec<ChatMessage>,
        state: ConversationState,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            user_id: user_id.into(),
            messages,
            state,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        let preview = self
            .messages
            .iter()
            .find(|m| m.role == crate::message::Role::User)
            .map(|m| m.content.chars().take(80).collect())
            .unwrap_or_default();
        SessionSummary {
            session_id: self.session_id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count: self.messages.len(),
            preview,
        }
    }
}

/// Listing row for a saved session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    /// First user turn, truncated.
    pub preview: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_session_id_gets_generated() {
        let session = ChatSession::new(Some("  ".into()), "u1", vec![], ConversationState::default());
        assert!(Uuid::parse_str(&session.session_id).is_ok());

        let session = ChatSession::new(Some("mine".into()), "u1", vec![], ConversationState::default());
        assert_eq!(session.session_id, "mine");
    }

    #[test]
    fn test_summary_preview() {
        let session = ChatSession::new(
            None,
            "u1",
            vec![
                ChatMessage::user("Tell me about wearable projects"),
                ChatMessage::assistant("Sure"),
            ],
            ConversationState::default(),
        );
        let summary = session.summary();
        assert_eq!(summary.message_count, 2);
        assert_eq!(summary.preview, "Tell me about wearable projects");
    }
}
