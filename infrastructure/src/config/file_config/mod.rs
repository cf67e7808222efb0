//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! They deserialize directly and convert into application-level config.

mod agent;
mod completion;
mod runtime;

pub use agent::FileAgentConfig;
pub use completion::FileCompletionConfig;
pub use runtime::{
    FileComputerConfig, FileLoggingConfig, FileMemoryConfig, FileOrchestratorConfig,
    FilePerceptionConfig,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("{0} cannot be 0")]
    ZeroValue(&'static str),

    #[error("model name cannot be empty")]
    EmptyModelName,

    #[error("{field}: unknown value '{value}' (expected one of: {expected})")]
    InvalidValue {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error(
        "completion.max_retries = {max_retries} with base_delay_ms = {base_delay_ms} \
         exceeds max_delay_ms = {max_delay_ms}; retry delays would stop increasing"
    )]
    BackoffCapped {
        max_retries: u32,
        base_delay_ms: u64,
        max_delay_ms: u64,
    },

    #[error("{field}: invalid pattern: {message}")]
    InvalidPattern {
        field: &'static str,
        message: String,
    },
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Completion backend and retry settings
    pub completion: FileCompletionConfig,
    /// Agent loop bounds
    pub agent: FileAgentConfig,
    pub perception: FilePerceptionConfig,
    pub memory: FileMemoryConfig,
    pub computer: FileComputerConfig,
    pub orchestrator: FileOrchestratorConfig,
    pub logging: FileLoggingConfig,
}

impl FileConfig {
    /// Reject settings the loop cannot run with; first problem wins.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.completion.validate()?;
        self.agent.validate()?;
        if self.orchestrator.sweep_interval_secs == 0 {
            return Err(ConfigValidationError::ZeroValue("orchestrator.sweep_interval_secs"));
        }
        if self.computer.command_timeout_secs == 0 {
            return Err(ConfigValidationError::ZeroValue("computer.command_timeout_secs"));
        }
        self.computer.to_guard().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_config() {
        let toml_str = r#"
[completion]
backend = "ollama"
base_url = "http://gpu-box:11434"
model = "qwen2.5-coder"
timeout_secs = 300

[agent]
max_iterations = 20
forced_progress = "fail"

[perception]
capture_screenshot = true

[memory]
persist = true
directory = "/tmp/taskpilot"

[computer]
blocked_patterns = ["sudo"]

[logging]
event_log = "events.jsonl"
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.completion.backend, "ollama");
        assert_eq!(config.completion.model.as_deref(), Some("qwen2.5-coder"));
        assert_eq!(config.completion.timeout_secs, 300);
        assert_eq!(config.agent.max_iterations, 20);
        assert!(config.perception.capture_screenshot);
        assert!(config.memory.persist);
        assert_eq!(config.computer.blocked_patterns.as_ref().unwrap().len(), 1);
        assert!(config.logging.event_log.is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: FileConfig = toml::from_str("[agent]\nunblock_threshold = 2\n").unwrap();
        assert_eq!(config.agent.unblock_threshold, 2);
        // Defaults should apply
        assert_eq!(config.agent.max_iterations, 50);
        assert_eq!(config.completion.backend, "openai");
        assert!(config.computer.enabled);
        assert!(!config.memory.persist);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = FileConfig::default();
        assert!(config.validate().is_ok());

        config.completion.timeout_secs = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::ZeroValue("completion.timeout_secs"))
        );
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "completion.timeout_secs cannot be 0"
        );
    }
}
