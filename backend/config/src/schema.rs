//! ChatITP runtime configuration schema.
//!
//! Every section has full defaults so an empty YAML file (or none at all)
//! deserializes; credentials come from the environment.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatItpConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub image: ImageConfig,
    pub embeddings: EmbeddingsConfig,
    pub engine: EngineConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

// ---------------------------------------------------------------------------
// LLM providers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    #[default]
    Replicate,
    OpenRouter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    /// `owner/name` for Replicate, a routed model id for OpenRouter.
    pub model: String,
    pub api_token: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Upper bound on every LLM, image, and retrieval call.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::Replicate,
            model: "meta/meta-llama-3-70b-instruct".to_string(),
            api_token: None,
            base_url: None,
            max_tokens: 1024,
            temperature: 0.7,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageConfig {
    pub enabled: bool,
    pub model: String,
    pub width: u32,
    pub height: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "stability-ai/stable-diffusion-3".to_string(),
            width: 1024,
            height: 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Project catalog / embeddings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    #[default]
    Replicate,
    OpenAI,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingsConfig {
    pub provider: EmbeddingProviderKind,
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// JSON catalog of projects indexed at startup.
    pub catalog_path: String,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Replicate,
            model: None,
            api_key: None,
            catalog_path: "projects.json".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Logs longer than this are summarized before prompting.
    pub summarize_threshold: usize,
    /// Most recent turns always passed verbatim.
    pub max_full_history: usize,
    /// Run the self-validation pass every N interactions.
    pub context_validation_interval: u64,
    pub unique_project_attempts: usize,
    pub random_pool_size: usize,
    pub specific_pool_size: usize,
    /// Turns of history used to build an image prompt.
    pub image_history_turns: usize,
    /// Run the post-turn state extraction as a spawned task instead of inline.
    pub detach_state_updates: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            summarize_threshold: 50,
            max_full_history: 10,
            context_validation_interval: 10,
            unique_project_attempts: 10,
            random_pool_size: 10,
            specific_pool_size: 5,
            image_history_turns: 4,
            detach_state_updates: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    pub backend: SessionBackend,
    pub db_path: String,
    /// Idle time after which a live working set is evicted from the cache.
    pub live_ttl_secs: u64,
    pub live_max_entries: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::Sqlite,
            db_path: "chatitp.db".to_string(),
            live_ttl_secs: 24 * 3600,
            live_max_entries: 10_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for daily-rolling JSON logs; console only when unset.
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}
