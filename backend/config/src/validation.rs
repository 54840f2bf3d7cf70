//! Config validation. Errors are fatal at startup; warnings are logged.

use crate::schema::ChatItpConfig;
use thiserror::Error;

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// All errors and warnings found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &ChatItpConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_llm(config, &mut report);
    validate_embeddings(config, &mut report);
    validate_engine(config, &mut report);
    validate_storage(config, &mut report);
    report
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).map(str::is_empty).unwrap_or(true)
}

fn validate_llm(config: &ChatItpConfig, report: &mut ValidationReport) {
    if is_blank(&config.llm.api_token) {
        report.error(
            "llm.apiToken",
            "No LLM API token configured (set REPLICATE_API_TOKEN or OPENROUTER_API_KEY)",
        );
    }
    if config.llm.model.trim().is_empty() {
        report.error("llm.model", "Model cannot be empty");
    }
    if config.llm.timeout_secs == 0 {
        report.error("llm.timeoutSecs", "timeoutSecs must be > 0");
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        report.warn("llm.temperature", "temperature outside 0.0..=2.0");
    }
    if config.image.enabled && (config.image.width == 0 || config.image.height == 0) {
        report.error("image", "width and height must be > 0");
    }
}

fn validate_embeddings(config: &ChatItpConfig, report: &mut ValidationReport) {
    if is_blank(&config.embeddings.api_key) {
        report.error(
            "embeddings.apiKey",
            "No embeddings API key configured (set REPLICATE_API_TOKEN or OPENAI_API_KEY)",
        );
    }
    if config.embeddings.catalog_path.trim().is_empty() {
        report.error("embeddings.catalogPath", "A project catalog path is required");
    }
}

fn validate_engine(config: &ChatItpConfig, report: &mut ValidationReport) {
    let engine = &config.engine;
    if engine.max_full_history == 0 {
        report.error("engine.maxFullHistory", "maxFullHistory must be >= 1");
    }
    if engine.summarize_threshold <= engine.max_full_history {
        report.error(
            "engine.summarizeThreshold",
            "summarizeThreshold must be greater than maxFullHistory",
        );
    }
    if engine.context_validation_interval == 0 {
        report.error(
            "engine.contextValidationInterval",
            "contextValidationInterval must be >= 1",
        );
    }
    if engine.unique_project_attempts == 0 {
        report.error("engine.uniqueProjectAttempts", "uniqueProjectAttempts must be >= 1");
    }
    if engine.random_pool_size == 0 || engine.specific_pool_size == 0 {
        report.error("engine", "retrieval pool sizes must be >= 1");
    }
}

fn validate_storage(config: &ChatItpConfig, report: &mut ValidationReport) {
    if config.storage.db_path.trim().is_empty() {
        report.error("storage.dbPath", "dbPath cannot be empty");
    }
    if config.storage.live_ttl_secs < 60 {
        report.warn(
            "storage.liveTtlSecs",
            "Live working sets idle for less than a minute will be evicted",
        );
    }
}
