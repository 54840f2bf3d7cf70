//! Environment handling: `${VAR}` substitution inside config values and
//! well-known variables overriding file settings.
//!
//! Only uppercase `[A-Z_][A-Z0-9_]*` names are substituted. `$${VAR}` escapes
//! to a literal `${VAR}`.

use std::collections::HashMap;

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::schema::ChatItpConfig;

static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\$?)\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

/// Error returned for missing env vars.
#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute `${VAR}` references in a config value tree using the process environment.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    resolve_env_vars_with(value, &std::env::vars().collect())
}

/// Substitute env vars using a provided map.
pub fn resolve_env_vars_with(value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    substitute_value(value, env, "")
}

fn substitute_value(value: &Value, env: &HashMap<String, String>, path: &str) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(substitute_string(s, env, path)?)),
        Value::Array(arr) => arr
            .iter()
            .enumerate()
            .map(|(i, v)| substitute_value(v, env, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut result = serde_json::Map::new();
            for (k, v) in map {
                let child_path = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                result.insert(k.clone(), substitute_value(v, env, &child_path)?);
            }
            Ok(Value::Object(result))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_string(s: &str, env: &HashMap<String, String>, path: &str) -> Result<String> {
    if !s.contains('$') {
        return Ok(s.to_string());
    }

    let mut missing: Option<MissingEnvVarError> = None;
    let substituted = ENV_VAR_PATTERN.replace_all(s, |caps: &regex::Captures| {
        let var_name = &caps[2];
        if !caps[1].is_empty() {
            return format!("${{{var_name}}}");
        }
        match env.get(var_name) {
            Some(val) if !val.is_empty() => val.clone(),
            _ => {
                missing.get_or_insert_with(|| MissingEnvVarError {
                    var_name: var_name.to_string(),
                    config_path: path.to_string(),
                });
                String::new()
            }
        }
    });

    if let Some(err) = missing {
        bail!(err);
    }
    Ok(substituted.into_owned())
}

/// Apply well-known environment variables on top of file settings.
pub fn apply_env_overrides(config: &mut ChatItpConfig) {
    apply_env_overrides_with(config, &std::env::vars().collect());
}

pub fn apply_env_overrides_with(config: &mut ChatItpConfig, env: &HashMap<String, String>) {
    let get = |name: &str| env.get(name).filter(|v| !v.trim().is_empty()).cloned();

    if let Some(bind) = get("CHATITP_BIND") {
        config.server.bind_address = bind;
    }
    if let Some(port) = get("CHATITP_PORT").or_else(|| get("PORT")) {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(_) => tracing::warn!(value = %port, "Ignoring non-numeric port override"),
        }
    }
    if let Some(db) = get("CHATITP_DB") {
        config.storage.db_path = db;
    }
    if let Some(catalog) = get("CHATITP_CATALOG") {
        config.embeddings.catalog_path = catalog;
    }
    if let Some(level) = get("RUST_LOG") {
        config.logging.level = level;
    }

    let replicate = get("REPLICATE_API_TOKEN");
    let openrouter = get("OPENROUTER_API_KEY");
    let openai = get("OPENAI_API_KEY");

    if config.llm.api_token.is_none() {
        config.llm.api_token = match config.llm.provider {
            crate::schema::LlmProviderKind::Replicate => replicate.clone(),
            crate::schema::LlmProviderKind::OpenRouter => openrouter,
        };
    }
    if config.embeddings.api_key.is_none() {
        config.embeddings.api_key = match config.embeddings.provider {
            crate::schema::EmbeddingProviderKind::Replicate => replicate,
            crate::schema::EmbeddingProviderKind::OpenAI => openai,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LlmProviderKind;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_nested_var() {
        let v = json!({"llm": {"apiToken": "${REPLICATE_API_TOKEN}"}});
        let result = resolve_env_vars_with(&v, &env(&[("REPLICATE_API_TOKEN", "r8_abc")])).unwrap();
        assert_eq!(result["llm"]["apiToken"], "r8_abc");
    }

    #[test]
    fn error_on_missing_var() {
        let v = json!({"key": "${MISSING_VAR}"});
        let err = resolve_env_vars_with(&v, &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("MISSING_VAR"));
        assert!(err.to_string().contains("key"));
    }

    #[test]
    fn escaped_reference_is_literal() {
        let v = json!({"key": "$${HOME_DIR}"});
        let result = resolve_env_vars_with(&v, &HashMap::new()).unwrap();
        assert_eq!(result["key"], "${HOME_DIR}");
    }

    #[test]
    fn overrides_pick_provider_specific_token() {
        let mut cfg = ChatItpConfig::default();
        cfg.llm.provider = LlmProviderKind::OpenRouter;
        apply_env_overrides_with(
            &mut cfg,
            &env(&[
                ("REPLICATE_API_TOKEN", "r8_token"),
                ("OPENROUTER_API_KEY", "sk-or-key"),
                ("CHATITP_PORT", "8088"),
            ]),
        );
        assert_eq!(cfg.llm.api_token.as_deref(), Some("sk-or-key"));
        assert_eq!(cfg.embeddings.api_key.as_deref(), Some("r8_token"));
        assert_eq!(cfg.server.port, 8088);
    }

    #[test]
    fn file_token_wins_over_env() {
        let mut cfg = ChatItpConfig::default();
        cfg.llm.api_token = Some("from-file".into());
        apply_env_overrides_with(&mut cfg, &env(&[("REPLICATE_API_TOKEN", "from-env")]));
        assert_eq!(cfg.llm.api_token.as_deref(), Some("from-file"));
    }
}
