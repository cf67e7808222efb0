//! Runtime sections from TOML: `[perception]`, `[memory]`, `[computer]`,
//! `[orchestrator]`, `[logging]`

use super::ConfigValidationError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use taskpilot_application::{CommandGuard, OrchestratorConfig, PerceptionConfig};

/// Relevant-code selection limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePerceptionConfig {
    pub max_relevant_files: usize,
    pub max_file_bytes: u64,
    pub capture_screenshot: bool,
}

impl Default for FilePerceptionConfig {
    fn default() -> Self {
        let defaults = PerceptionConfig::default();
        Self {
            max_relevant_files: defaults.max_relevant_files,
            max_file_bytes: defaults.max_file_bytes,
            capture_screenshot: defaults.capture_screenshot,
        }
    }
}

impl FilePerceptionConfig {
    pub fn to_perception_config(&self) -> PerceptionConfig {
        PerceptionConfig {
            max_relevant_files: self.max_relevant_files,
            max_file_bytes: self.max_file_bytes,
            capture_screenshot: self.capture_screenshot,
            ..PerceptionConfig::default()
        }
    }
}

/// On-disk mirror of the memory store
///
/// ```toml
/// [memory]
/// persist = true
/// directory = ".taskpilot/memory"   # default: platform data dir
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileMemoryConfig {
    pub persist: bool,
    pub directory: Option<PathBuf>,
}

impl FileMemoryConfig {
    /// `directory`, or `<data dir>/taskpilot/memory`
    pub fn resolve_directory(&self) -> Option<PathBuf> {
        self.directory
            .clone()
            .or_else(|| dirs::data_local_dir().map(|d| d.join("taskpilot").join("memory")))
    }
}

/// OS command execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileComputerConfig {
    pub enabled: bool,
    /// Regex deny-list; unset keeps the built-in list, `[]` allows everything
    pub blocked_patterns: Option<Vec<String>>,
    pub command_timeout_secs: u64,
}

impl Default for FileComputerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            blocked_patterns: None,
            command_timeout_secs: 60,
        }
    }
}

impl FileComputerConfig {
    pub fn to_guard(&self) -> Result<CommandGuard, ConfigValidationError> {
        match &self.blocked_patterns {
            None => Ok(CommandGuard::default()),
            Some(patterns) => CommandGuard::with_patterns(patterns).map_err(|e| {
                ConfigValidationError::InvalidPattern {
                    field: "computer.blocked_patterns",
                    message: e.to_string(),
                }
            }),
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Idle-run sweeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOrchestratorConfig {
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for FileOrchestratorConfig {
    fn default() -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            idle_timeout_secs: defaults.idle_timeout.as_secs(),
            sweep_interval_secs: defaults.sweep_interval.as_secs(),
        }
    }
}

impl FileOrchestratorConfig {
    pub fn to_orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }
}

/// Log destinations
///
/// ```toml
/// [logging]
/// event_log = "taskpilot-events.jsonl"
/// file = "taskpilot.log"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    /// JSONL lifecycle event log
    pub event_log: Option<PathBuf>,
    /// Diagnostic log file, in addition to stderr
    pub file: Option<PathBuf>,
}
