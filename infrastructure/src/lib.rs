//! Infrastructure layer for taskpilot
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer, including configuration file loading.

pub mod browser;
pub mod completion;
pub mod computer;
pub mod config;
pub mod fs;
pub mod logging;
pub mod persistence;

// Re-export commonly used types
pub use browser::HttpBrowser;
pub use completion::{
    BackendBuildError, BackendKind, CompletionSettings, OllamaBackend, OpenAiCompatibleBackend,
    build_backend,
};
pub use computer::LocalComputer;
pub use config::{ConfigLoader, ConfigValidationError, FileConfig};
pub use fs::LocalFileSystem;
pub use logging::JsonlEventLog;
pub use persistence::{JsonFilePersistence, TermFrequencyIndex};
