//! Runtime knobs for the conversation engine, resolved from `ChatItpConfig`.

use std::time::Duration;

use chatitp_config::ChatItpConfig;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Logs longer than this are partially summarized.
    pub summarize_threshold: usize,
    /// Most recent turns kept verbatim once summarizing.
    pub max_full_history: usize,
    pub context_validation_interval: u64,
    pub unique_project_attempts: usize,
    pub random_pool_size: usize,
    pub specific_pool_size: usize,
    pub image_history_turns: usize,
    pub detach_state_updates: bool,
    /// Applied to every LLM, search and image call.
    pub call_timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    pub image_enabled: bool,
    pub image_width: u32,
    pub image_height: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&ChatItpConfig::default())
    }
}

impl From<&ChatItpConfig> for EngineSettings {
    fn from(config: &ChatItpConfig) -> Self {
        let engine = &config.engine;
        Self {
            summarize_threshold: engine.summarize_threshold,
            max_full_history: engine.max_full_history,
            context_validation_interval: engine.context_validation_interval,
            unique_project_attempts: engine.unique_project_attempts,
            random_pool_size: engine.random_pool_size,
            specific_pool_size: engine.specific_pool_size,
            image_history_turns: engine.image_history_turns,
            detach_state_updates: engine.detach_state_updates,
            call_timeout: Duration::from_secs(config.llm.timeout_secs),
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
            image_enabled: config.image.enabled,
            image_width: config.image.width,
            image_height: config.image.height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_config() {
        let s = EngineSettings::default();
        assert_eq!(s.summarize_threshold, 50);
        assert_eq!(s.max_full_history, 10);
        assert_eq!(s.context_validation_interval, 10);
        assert_eq!(s.unique_project_attempts, 10);
        assert_eq!(s.random_pool_size, 10);
        assert_eq!(s.specific_pool_size, 5);
        assert_eq!(s.call_timeout, Duration::from_secs(120));
    }
}
