//! Per-user live working sets held in the live store.
//!
//! The message log and state are stored under separate keys as JSON strings:
//! `chat:{user}:messages` and `chat:{user}:state`. `chat:{user}:epoch` counts
//! how many times the set was replaced or cleared, so work started against an
//! older conversation can tell it is stale.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use chatitp_core::{ChatError, ChatMessage, ConversationState, LiveStore};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingSet {
    pub messages: Vec<ChatMessage>,
    pub state: ConversationState,
}

impl WorkingSet {
    /// Fresh conversation: a single system turn.
    pub fn initial(system_prompt: &str) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt)],
            state: ConversationState::new(system_prompt),
        }
    }
}

pub fn messages_key(user_id: &str) -> String {
    format!("chat:{user_id}:messages")
}

pub fn state_key(user_id: &str) -> String {
    format!("chat:{user_id}:state")
}

pub fn epoch_key(user_id: &str) -> String {
    format!("chat:{user_id}:epoch")
}

#[derive(Clone)]
pub struct WorkingSets {
    store: Arc<dyn LiveStore>,
}

impl WorkingSets {
    pub fn new(store: Arc<dyn LiveStore>) -> Self {
        Self { store }
    }

    async fn read<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, ChatError> {
        match self.store.get(key).await.map_err(ChatError::persistence)? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| ChatError::Persistence(format!("corrupt live entry {key}: {e}"))),
            None => Ok(T::default()),
        }
    }

    /// Load a user's working set. A missing set reads as empty.
    pub async fn load(&self, user_id: &str) -> Result<WorkingSet, ChatError> {
        Ok(WorkingSet {
            messages: self.read(&messages_key(user_id)).await?,
            state: self.read(&state_key(user_id)).await?,
        })
    }

    pub async fn save(&self, user_id: &str, set: &WorkingSet) -> Result<(), ChatError> {
        let messages = serde_json::to_string(&set.messages).map_err(ChatError::persistence)?;
        let state = serde_json::to_string(&set.state).map_err(ChatError::persistence)?;
        self.store
            .set(&messages_key(user_id), messages)
            .await
            .map_err(ChatError::persistence)?;
        self.store
            .set(&state_key(user_id), state)
            .await
            .map_err(ChatError::persistence)
    }

    /// Current epoch of a user's working set; zero before the first replacement.
    pub async fn epoch(&self, user_id: &str) -> Result<u64, ChatError> {
        self.read(&epoch_key(user_id)).await
    }

    async fn bump_epoch(&self, user_id: &str) -> Result<u64, ChatError> {
        let next = self.epoch(user_id).await? + 1;
        self.store
            .set(&epoch_key(user_id), next.to_string())
            .await
            .map_err(ChatError::persistence)?;
        Ok(next)
    }

    /// Start a new conversation from `set`, invalidating work begun on the old one.
    pub async fn replace(&self, user_id: &str, set: &WorkingSet) -> Result<u64, ChatError> {
        self.save(user_id, set).await?;
        self.bump_epoch(user_id).await
    }

    pub async fn clear(&self, user_id: &str) -> Result<(), ChatError> {
        self.store
            .delete(&messages_key(user_id))
            .await
            .map_err(ChatError::persistence)?;
        self.store
            .delete(&state_key(user_id))
            .await
            .map_err(ChatError::persistence)?;
        self.bump_epoch(user_id).await.map(|_| ())
    }
}
