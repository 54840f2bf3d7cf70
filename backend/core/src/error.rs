use thiserror::Error;

/// Top-level error type for the ChatITP conversation backend.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("no unique project found after {attempts} sampling rounds")]
    Exhaustion { attempts: usize },

    #[error("summarization failed: {0}")]
    Summarization(String),

    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl ChatError {
    /// Wrap a collaborator failure as a generation error, keeping the cause chain in the message.
    pub fn generation(err: impl std::fmt::Display) -> Self {
        ChatError::Generation(err.to_string())
    }

    /// Wrap a store failure as a persistence error.
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        ChatError::Persistence(err.to_string())
    }
}
