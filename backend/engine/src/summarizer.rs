use chatitp_core::message::render_transcript;
use chatitp_core::{ChatError, ChatMessage};
use tracing::debug;

use crate::llm::LlmClient;
use crate::prompts;

/// Condenses older turns into a short narrative.
#[derive(Clone)]
pub struct Summarizer {
    llm: LlmClient,
}

impl Summarizer {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// One model call, no retry. Any failure aborts the turn as `Summarization`.
    pub async fn summarize(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        debug!(messages = messages.len(), "Summarizing history");
        self.llm
            .complete("", &prompts::summary(&render_transcript(messages)))
            .await
            .map(|s| s.trim().to_string())
            .map_err(|e| ChatError::Summarization(e.to_string()))
    }
}
