use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use chatitp_core::{ImageGenerator, ImageOutcome, LlmProvider, LlmRequest, LlmResponse};

/// A scripted LLM provider for tests.
///
/// Rules are checked in registration order against the user prompt; the first
/// whose needle appears wins. Unmatched prompts get the default response.
pub struct ScriptedProvider {
    rules: Vec<(String, Value)>,
    default_response: Value,
    failing: bool,
    seen: Mutex<Vec<LlmRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            default_response: Value::String("Mock response".to_string()),
            failing: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn when(mut self, needle: impl Into<String>, response: impl Into<Value>) -> Self {
        self.rules.push((needle.into(), response.into()));
        self
    }

    pub fn with_default(mut self, response: impl Into<Value>) -> Self {
        self.default_response = response.into();
        self
    }

    /// Every call returns an error.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Number of received requests whose user prompt contains `needle`.
    pub fn count_matching(&self, needle: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.user_prompt.contains(needle))
            .count()
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, req: &LlmRequest) -> Result<LlmResponse> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(req.clone());
        }
        if self.failing {
            bail!("scripted provider failure");
        }

        let output = self
            .rules
            .iter()
            .find(|(needle, _)| req.user_prompt.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.default_response.clone());

        Ok(LlmResponse {
            output,
            provider: "scripted".to_string(),
            model: "mock".to_string(),
            latency_ms: 0,
        })
    }
}

/// Image generator that always returns the same outcome and records prompts.
pub struct StaticImageGenerator {
    outcome: ImageOutcome,
    prompts: Mutex<Vec<String>>,
}

impl StaticImageGenerator {
    pub fn new(outcome: ImageOutcome) -> Self {
        Self {
            outcome,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ImageGenerator for StaticImageGenerator {
    async fn generate_image(&self, prompt: &str, _width: u32, _height: u32) -> ImageOutcome {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.outcome.clone()
    }
}
