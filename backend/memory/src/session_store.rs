use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use chatitp_core::{ChatSession, SessionRepository, SessionSummary};

/// In-memory session repository for tests and ephemeral deployments.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<(String, String), ChatSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionStore {
    async fn upsert(&self, session: &ChatSession) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(|_| anyhow!("session store poisoned"))?;
        let key = (session.session_id.clone(), session.user_id.clone());
        let mut stored = session.clone();
        if let Some(existing) = sessions.get(&key) {
            stored.created_at = existing.created_at;
        }
        sessions.insert(key, stored);
        Ok(())
    }

    async fn find(&self, session_id: &str, user_id: &str) -> Result<Option<ChatSession>> {
        let sessions = self.sessions.read().map_err(|_| anyhow!("session store poisoned"))?;
        Ok(sessions
            .get(&(session_id.to_string(), user_id.to_string()))
            .cloned())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<SessionSummary>> {
        let sessions = self.sessions.read().map_err(|_| anyhow!("session store poisoned"))?;
        let mut rows: Vec<SessionSummary> = sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .map(ChatSession::summary)
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatitp_core::{ChatMessage, ConversationState};

    #[tokio::test]
    async fn test_upsert_and_find() {
        let store = InMemorySessionStore::new();
        let session = ChatSession::new(
            None,
            "u1",
            vec![ChatMessage::user("hi")],
            ConversationState::default(),
        );
        store.upsert(&session).await.unwrap();

        let found = store.find(&session.session_id, "u1").await.unwrap();
        assert_eq!(found, Some(session.clone()));
        assert!(store.find(&session.session_id, "u2").await.unwrap().is_none());
        assert_eq!(store.list("u1").await.unwrap().len(), 1);
    }
}
