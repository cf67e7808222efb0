//! Error type shared by the external collaborator ports.

use thiserror::Error;

/// Failure reported by a browser, file-system or computer-control adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operation timed out after {0}s")]
    Timeout(u64),

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl From<std::io::Error> for CollaboratorError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => CollaboratorError::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                CollaboratorError::PermissionDenied(err.to_string())
            }
            _ => CollaboratorError::Io(err.to_string()),
        }
    }
}
