//! Agent configuration from TOML (`[agent]` section)

use super::ConfigValidationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use taskpilot_application::{AgentConfig, ForcedProgressPolicy};

/// Raw agent loop configuration from TOML
///
/// # Example
///
/// ```toml
/// [agent]
/// max_iterations = 50
/// max_consecutive_failures = 3
/// unblock_threshold = 5
/// forced_progress = "bypass"      # "bypass" or "fail"
/// reflection_threshold = 3
/// research_timeout_secs = 120
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileAgentConfig {
    pub max_iterations: usize,
    pub max_consecutive_failures: usize,
    pub unblock_threshold: u32,
    /// What happens once unblocking keeps failing
    pub forced_progress: String,
    pub reflection_threshold: usize,
    pub history_window: usize,
    pub research_timeout_secs: u64,
    pub max_research_queries: usize,
    pub visit_top_results: usize,
}

impl Default for FileAgentConfig {
    fn default() -> Self {
        let defaults = AgentConfig::default();
        Self {
            max_iterations: defaults.max_iterations,
            max_consecutive_failures: defaults.max_consecutive_failures,
            unblock_threshold: defaults.unblock_threshold,
            forced_progress: defaults.forced_progress.to_string(),
            reflection_threshold: defaults.reflection_threshold,
            history_window: defaults.history_window,
            research_timeout_secs: defaults.research_timeout.as_secs(),
            max_research_queries: defaults.max_research_queries,
            visit_top_results: defaults.visit_top_results,
        }
    }
}

impl FileAgentConfig {
    /// Accepts: "bypass", "fail"
    pub fn parse_forced_progress(&self) -> Result<ForcedProgressPolicy, ConfigValidationError> {
        match self.forced_progress.to_lowercase().as_str() {
            "bypass" => Ok(ForcedProgressPolicy::Bypass),
            "fail" => Ok(ForcedProgressPolicy::Fail),
            _ => Err(ConfigValidationError::InvalidValue {
                field: "agent.forced_progress",
                value: self.forced_progress.clone(),
                expected: "bypass, fail",
            }),
        }
    }

    pub(super) fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.max_iterations == 0 {
            return Err(ConfigValidationError::ZeroValue("agent.max_iterations"));
        }
        if self.max_consecutive_failures == 0 {
            return Err(ConfigValidationError::ZeroValue("agent.max_consecutive_failures"));
        }
        if self.unblock_threshold == 0 {
            return Err(ConfigValidationError::ZeroValue("agent.unblock_threshold"));
        }
        if self.research_timeout_secs == 0 {
            return Err(ConfigValidationError::ZeroValue("agent.research_timeout_secs"));
        }
        self.parse_forced_progress().map(|_| ())
    }

    pub fn to_agent_config(&self) -> Result<AgentConfig, ConfigValidationError> {
        let mut config = AgentConfig::default()
            .with_max_iterations(self.max_iterations)
            .with_max_consecutive_failures(self.max_consecutive_failures)
            .with_unblock_threshold(self.unblock_threshold)
            .with_forced_progress(self.parse_forced_progress()?)
            .with_reflection_threshold(self.reflection_threshold)
            .with_research_timeout(Duration::from_secs(self.research_timeout_secs));
        config.history_window = self.history_window;
        config.max_research_queries = self.max_research_queries;
        config.visit_top_results = self.visit_top_results;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_mirror_agent_config() {
        let config = FileAgentConfig::default().to_agent_config().unwrap();
        let defaults = AgentConfig::default();
        assert_eq!(config.max_iterations, defaults.max_iterations);
        assert_eq!(config.forced_progress, ForcedProgressPolicy::Bypass);
        assert_eq!(config.research_timeout, defaults.research_timeout);
    }

    #[test]
    fn test_forced_progress_parsing() {
        let config = FileAgentConfig {
            forced_progress: "FAIL".into(),
            ..Default::default()
        };
        assert_eq!(config.parse_forced_progress(), Ok(ForcedProgressPolicy::Fail));

        let config = FileAgentConfig {
            forced_progress: "skip".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(config.to_agent_config().is_err());
    }

    #[test]
    fn test_zero_iteration_cap_rejected() {
        let config = FileAgentConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::ZeroValue("agent.max_iterations"))
        );
    }
}
