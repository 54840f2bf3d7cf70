use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::session::{ChatSession, SessionSummary};

/// Text completion backend (Replicate, OpenRouter, test doubles).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., "replicate", "openrouter").
    fn name(&self) -> &str;

    /// Send a completion request and return the raw model output.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;
}

/// Request to an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl LlmRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Response from an LLM provider.
///
/// `output` is kept loosely typed: a string, an array of string fragments, or null.
/// Callers go through [`crate::normalize_completion`].
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub output: serde_json::Value,
    pub provider: String,
    pub model: String,
    pub latency_ms: u64,
}

/// Result of an image generation attempt. `content` is an image URL on success,
/// a human-readable reason otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageOutcome {
    pub success: bool,
    pub content: String,
}

impl ImageOutcome {
    pub fn success(url: impl Into<String>) -> Self {
        Self {
            success: true,
            content: url.into(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            content: reason.into(),
        }
    }
}

/// Image generation capability. Failures are reported in the outcome, not as errors.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(&self, prompt: &str, width: u32, height: u32) -> ImageOutcome;
}

/// A ranked project returned by semantic search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectHit {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub score: f32,
}

/// Semantic search over the project catalog, most relevant first.
#[async_trait]
pub trait ProjectSearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ProjectHit>>;
}

/// Fast key-value store holding each user's live working set.
#[async_trait]
pub trait LiveStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Durable storage of saved chat sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert or replace by `(session_id, user_id)`.
    async fn upsert(&self, session: &ChatSession) -> Result<()>;

    async fn find(&self, session_id: &str, user_id: &str) -> Result<Option<ChatSession>>;

    /// Sessions owned by `user_id`, most recently updated first.
    async fn list(&self, user_id: &str) -> Result<Vec<SessionSummary>>;
}
