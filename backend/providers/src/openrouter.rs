//! OpenAI-compatible chat completions backend.
//!
//! Defaults to OpenRouter; any server speaking `/chat/completions` works via
//! [`OpenRouterProvider::with_base_url`].

use std::time::Instant;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use chatitp_core::{LlmProvider, LlmRequest, LlmResponse};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const APP_TITLE: &str = "ChatITP";

pub struct OpenRouterProvider {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenRouterProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn payload(&self, request: &LlmRequest) -> Value {
        let mut turns = Vec::with_capacity(2);
        if !request.system_prompt.trim().is_empty() {
            turns.push(json!({ "role": "system", "content": request.system_prompt }));
        }
        turns.push(json!({ "role": "user", "content": request.user_prompt }));
        json!({
            "model": self.model,
            "messages": turns,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        })
    }
}

/// First choice's text, or null when the reply carries none.
fn first_choice(body: &Value) -> Value {
    match body.pointer("/choices/0/message/content") {
        Some(Value::String(text)) => Value::String(text.clone()),
        _ => Value::Null,
    }
}

/// Error text from an `{"error": {"message": ...}}` body, falling back to the raw body.
fn error_message(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| raw.trim().to_string())
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let started = Instant::now();
        debug!(model = %self.model, "Requesting chat completion");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("X-Title", APP_TITLE)
            .json(&self.payload(request))
            .send()
            .await
            .context("chat completion request failed")?;

        let status = response.status();
        let raw = response.text().await.context("failed to read chat completion body")?;
        if !status.is_success() {
            bail!("chat completion returned {}: {}", status, error_message(&raw));
        }

        let body: Value = serde_json::from_str(&raw).context("chat completion body is not JSON")?;
        let output = first_choice(&body);
        if output.is_null() {
            warn!(model = %self.model, "Chat completion carried no message content");
        }

        Ok(LlmResponse {
            output,
            provider: self.name().to_string(),
            model: self.model.clone(),
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_skips_blank_system_prompt() {
        let provider = OpenRouterProvider::new("key", "meta-llama/llama-3-70b-instruct");
        let payload = provider.payload(&LlmRequest::new("  ", "hi").with_max_tokens(64));
        assert_eq!(payload["messages"].as_array().unwrap().len(), 1);
        assert_eq!(payload["messages"][0]["role"], "user");
        assert_eq!(payload["max_tokens"], 64);

        let payload = provider.payload(&LlmRequest::new("Be brief.", "hi"));
        assert_eq!(payload["messages"][0]["content"], "Be brief.");
    }

    #[test]
    fn test_first_choice() {
        let body = json!({ "choices": [{ "message": { "role": "assistant", "content": "Hello" } }] });
        assert_eq!(first_choice(&body), json!("Hello"));
        assert!(first_choice(&json!({ "choices": [] })).is_null());
        assert!(first_choice(&json!({ "choices": [{ "message": { "content": null } }] })).is_null());
    }

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(r#"{"error":{"message":"No credits"}}"#), "No credits");
        assert_eq!(error_message("bad gateway\n"), "bad gateway");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let provider = OpenRouterProvider::new("k", "m").with_base_url("http://localhost:8080/v1/");
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
    }
}
