//! `chatitp-config`: ChatITP runtime configuration.
//!
//! Provides:
//! - Typed config schema with defaults for every section
//! - YAML loading
//! - `${ENV_VAR}` substitution and well-known env overrides
//! - Config redaction for safe display
//! - Validation with a fail-fast check (`ensure_valid`)

pub mod env;
pub mod io;
pub mod redact;
pub mod schema;
pub mod validation;

pub use env::{apply_env_overrides, resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_file_path, load_config_value};
pub use redact::redact;
pub use schema::{
    ChatItpConfig, EmbeddingProviderKind, EmbeddingsConfig, EngineConfig, ImageConfig, LlmConfig,
    LlmProviderKind, LoggingConfig, ServerConfig, SessionBackend, StorageConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Load, substitute env vars, and apply env overrides, without validating.
pub async fn load(path: Option<&Path>) -> Result<ChatItpConfig> {
    let path = config_file_path(path);
    let value = load_config_value(&path).await?;
    let value = resolve_env_vars(&value).context("Failed to resolve env vars in config")?;

    let mut config: ChatItpConfig =
        serde_json::from_value(value).context("Failed to deserialize config")?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Log every finding in the validation report and fail if it has errors.
///
/// Call this after the logger is installed so the findings are visible.
pub fn ensure_valid(config: &ChatItpConfig) -> Result<()> {
    let report = validate(config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    if !report.is_valid() {
        bail!(
            "invalid configuration ({} error(s)); first: {}",
            report.errors.len(),
            report.errors[0]
        );
    }
    Ok(())
}
