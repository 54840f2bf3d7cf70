//! Single entry point for text completions.
//!
//! Every call is bounded by the configured timeout and its raw output goes
//! through `normalize_completion`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use chatitp_core::{normalize_completion, ChatError, LlmProvider, LlmRequest};

#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    timeout: Duration,
    max_tokens: u32,
    temperature: f32,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            timeout,
            max_tokens: 1024,
            temperature: 0.7,
        }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Run one completion and return the normalized text.
    pub async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ChatError> {
        let request = LlmRequest::new(system_prompt, user_prompt)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        let response = match tokio::time::timeout(self.timeout, self.provider.complete(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(provider = %self.provider.name(), error = %e, "LLM call failed");
                return Err(ChatError::generation(format!("{:#}", e)));
            }
            Err(_) => {
                warn!(provider = %self.provider.name(), timeout_secs = self.timeout.as_secs(), "LLM call timed out");
                return Err(ChatError::Generation(format!(
                    "LLM call timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        debug!(
            provider = %response.provider,
            model = %response.model,
            latency_ms = response.latency_ms,
            "LLM call completed"
        );
        normalize_completion(&response.output)
    }
}
