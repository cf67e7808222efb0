//! Completion backend port
//!
//! Defines the interface for one language-model provider. Backends are
//! chosen once at construction; callers only see the
//! [`CompletionService`](crate::services::completion::CompletionService).

use async_trait::async_trait;
use taskpilot_domain::{CompletionOptions, CompletionResponse};
use thiserror::Error;

/// How the completion service should react to a backend error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient: retry with backoff
    Retryable,
    /// Never retried; reported verbatim to the caller
    Terminal,
    /// Never retried; the service falls back to non-completion behavior for the rest of the run
    QuotaExhausted,
}

/// Errors that can occur during a backend call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl BackendError {
    pub fn classification(&self) -> ErrorClass {
        match self {
            BackendError::RateLimited(_) | BackendError::QuotaExceeded(_) => {
                ErrorClass::QuotaExhausted
            }
            BackendError::Authentication(_) | BackendError::BadRequest(_) => ErrorClass::Terminal,
            BackendError::Server { status, .. } if *status < 500 => ErrorClass::Terminal,
            BackendError::Transport(_)
            | BackendError::Timeout
            | BackendError::Server { .. }
            | BackendError::InvalidResponse(_)
            | BackendError::Other(_) => ErrorClass::Retryable,
        }
    }

    /// Map an HTTP error status and body to a backend error.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = body.trim().to_string();
        match status {
            401 | 403 => BackendError::Authentication(message),
            400 | 404 | 413 | 422 => BackendError::BadRequest(message),
            402 => BackendError::QuotaExceeded(message),
            429 if message.to_lowercase().contains("quota") => BackendError::QuotaExceeded(message),
            429 => BackendError::RateLimited(message),
            _ => BackendError::Server { status, message },
        }
    }
}

/// One language-model provider
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short name for logs (`"openai"`, `"ollama"`)
    fn name(&self) -> &str;

    /// Send a prompt and return the completion.
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(BackendError::Timeout.classification(), ErrorClass::Retryable);
        assert_eq!(
            BackendError::Server {
                status: 503,
                message: String::new()
            }
            .classification(),
            ErrorClass::Retryable
        );
        assert_eq!(
            BackendError::Authentication("bad key".into()).classification(),
            ErrorClass::Terminal
        );
        assert_eq!(
            BackendError::QuotaExceeded("insufficient_quota".into()).classification(),
            ErrorClass::QuotaExhausted
        );
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(
            BackendError::from_status(401, "nope"),
            BackendError::Authentication(_)
        ));
        assert!(matches!(
            BackendError::from_status(429, "You exceeded your current quota"),
            BackendError::QuotaExceeded(_)
        ));
        assert!(matches!(
            BackendError::from_status(429, "slow down"),
            BackendError::RateLimited(_)
        ));
        assert!(matches!(
            BackendError::from_status(502, "bad gateway"),
            BackendError::Server { status: 502, .. }
        ));
        assert_eq!(
            BackendError::from_status(409, "conflict").classification(),
            ErrorClass::Terminal
        );
    }
}
