//! Configuration file loading for taskpilot
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `TASKPILOT_*` environment variables
//! 2. `--config <path>` specified file
//! 3. Project root: `./taskpilot.toml` or `./.taskpilot.toml`
//! 4. Global: `$XDG_CONFIG_HOME/taskpilot/config.toml`
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigValidationError, FileAgentConfig, FileCompletionConfig, FileComputerConfig, FileConfig,
    FileLoggingConfig, FileMemoryConfig, FileOrchestratorConfig, FilePerceptionConfig,
};
pub use loader::ConfigLoader;
