//! HTTP completion backends
//!
//! Two [`CompletionBackend`] adapters over `reqwest`:
//!
//! - [`OpenAiCompatibleBackend`] — `POST {base_url}/chat/completions`
//! - [`OllamaBackend`] — `POST {base_url}/api/chat`
//!
//! Timeouts and retries belong to the application's completion service; the
//! adapters only translate one request and classify failures through
//! [`BackendError::from_status`](taskpilot_application::BackendError::from_status).

mod ollama;
mod openai;

pub use ollama::OllamaBackend;
pub use openai::OpenAiCompatibleBackend;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use taskpilot_application::{BackendError, CompletionBackend};
use taskpilot_domain::CompletionResponse;
use thiserror::Error;
use tracing::info;

const USER_AGENT: &str = concat!("taskpilot/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Which wire protocol to speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    OpenAi,
    Ollama,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::OpenAi => write!(f, "openai"),
            BackendKind::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "openai-compatible" => Ok(BackendKind::OpenAi),
            "ollama" => Ok(BackendKind::Ollama),
            other => Err(format!("unknown completion backend '{}'", other)),
        }
    }
}

/// Resolved settings for one backend instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSettings {
    pub kind: BackendKind,
    /// `None` uses the backend's public default endpoint
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Name of the variable the key was expected in, for error messages
    pub api_key_env: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionSettings {
    pub fn new(kind: BackendKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            base_url: None,
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
        }
    }

    // ==================== Builder Methods ====================

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[derive(Error, Debug)]
pub enum BackendBuildError {
    #[error("No API key for the {kind} backend (set {env})")]
    MissingApiKey { kind: BackendKind, env: String },

    #[error("Model name must not be empty")]
    EmptyModel,

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Construct the configured backend once per process.
pub fn build_backend(
    settings: &CompletionSettings,
) -> Result<Arc<dyn CompletionBackend>, BackendBuildError> {
    if settings.model.trim().is_empty() {
        return Err(BackendBuildError::EmptyModel);
    }
    let client = http_client()?;
    let backend: Arc<dyn CompletionBackend> = match settings.kind {
        BackendKind::OpenAi => {
            let api_key = settings
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| BackendBuildError::MissingApiKey {
                    kind: settings.kind,
                    env: settings.api_key_env.clone(),
                })?;
            Arc::new(OpenAiCompatibleBackend::new(client, settings, api_key))
        }
        BackendKind::Ollama => Arc::new(OllamaBackend::new(client, settings)),
    };
    info!(backend = %settings.kind, model = %settings.model, "Completion backend ready");
    Ok(backend)
}

fn http_client() -> Result<reqwest::Client, BackendBuildError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| BackendBuildError::Client(e.to_string()))
}

fn transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Transport(err.to_string())
    }
}

/// Read the body of a non-2xx response and classify it.
async fn status_error(response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    BackendError::from_status(status, &body)
}

/// JSON-hinted requests whose content parses as an object come back
/// structured; everything else is raw text for layered extraction.
fn into_response(content: String, wants_json: bool) -> CompletionResponse {
    if wants_json
        && let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(content.trim())
    {
        return CompletionResponse::Structured(value);
    }
    CompletionResponse::Raw(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_api_key_is_a_startup_error() {
        let settings = CompletionSettings::new(BackendKind::OpenAi, "gpt-4o-mini");
        let err = build_backend(&settings).err().unwrap();
        assert!(matches!(err, BackendBuildError::MissingApiKey { .. }));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_build_backends() {
        let openai = CompletionSettings::new(BackendKind::OpenAi, "gpt-4o-mini").with_api_key("k");
        assert_eq!(build_backend(&openai).unwrap().name(), "openai");

        let ollama = CompletionSettings::new(BackendKind::Ollama, "llama3.1");
        assert_eq!(build_backend(&ollama).unwrap().name(), "ollama");

        let empty = CompletionSettings::new(BackendKind::Ollama, " ");
        assert!(matches!(
            build_backend(&empty).err(),
            Some(BackendBuildError::EmptyModel)
        ));
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("OpenAI".parse::<BackendKind>(), Ok(BackendKind::OpenAi));
        assert_eq!("ollama".parse::<BackendKind>(), Ok(BackendKind::Ollama));
        assert!("bedrock".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_into_response() {
        assert_eq!(
            into_response(r#" {"a": 1} "#.to_string(), true),
            CompletionResponse::Structured(json!({"a": 1}))
        );
        assert_eq!(
            into_response(r#"{"a": 1}"#.to_string(), false),
            CompletionResponse::Raw(r#"{"a": 1}"#.to_string())
        );
        assert_eq!(
            into_response("```json\n{}\n```".to_string(), true),
            CompletionResponse::Raw("```json\n{}\n```".to_string())
        );
    }
}
