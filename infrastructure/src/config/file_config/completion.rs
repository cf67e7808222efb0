//! Completion backend configuration from TOML (`[completion]` section)

use super::ConfigValidationError;
use crate::completion::{BackendKind, CompletionSettings};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use taskpilot_application::RetryPolicy;

/// Raw completion configuration from TOML
///
/// # Example
///
/// ```toml
/// [completion]
/// backend = "openai"              # "openai" or "ollama"
/// base_url = "https://api.openai.com/v1"
/// api_key_env = "OPENAI_API_KEY"  # the key itself never lives in the file
/// model = "gpt-4o-mini"
/// timeout_secs = 120
/// max_retries = 3
/// base_delay_ms = 1000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCompletionConfig {
    pub backend: String,
    pub base_url: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Defaults per backend when unset
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Wall-clock budget for one request
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for FileCompletionConfig {
    fn default() -> Self {
        Self {
            backend: "openai".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: None,
            max_tokens: None,
            temperature: None,
            timeout_secs: 120,
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl FileCompletionConfig {
    pub fn parse_backend(&self) -> Result<BackendKind, ConfigValidationError> {
        self.backend
            .parse()
            .map_err(|_| ConfigValidationError::InvalidValue {
                field: "completion.backend",
                value: self.backend.clone(),
                expected: "openai, ollama",
            })
    }

    pub fn model_name(&self, kind: BackendKind) -> String {
        match (&self.model, kind) {
            (Some(model), _) => model.clone(),
            (None, BackendKind::OpenAi) => "gpt-4o-mini".to_string(),
            (None, BackendKind::Ollama) => "llama3.1".to_string(),
        }
    }

    pub(super) fn validate(&self) -> Result<(), ConfigValidationError> {
        self.parse_backend()?;
        if self.timeout_secs == 0 {
            return Err(ConfigValidationError::ZeroValue("completion.timeout_secs"));
        }
        if self.model.as_ref().is_some_and(|m| m.trim().is_empty()) {
            return Err(ConfigValidationError::EmptyModelName);
        }
        if self.base_delay_ms == 0 {
            return Err(ConfigValidationError::ZeroValue("completion.base_delay_ms"));
        }
        if self.to_retry_policy().reaches_cap() {
            return Err(ConfigValidationError::BackoffCapped {
                max_retries: self.max_retries,
                base_delay_ms: self.base_delay_ms,
                max_delay_ms: self.max_delay_ms,
            });
        }
        Ok(())
    }

    /// Resolve settings, reading the API key from `api_key_env`.
    pub fn to_settings(&self) -> Result<CompletionSettings, ConfigValidationError> {
        self.to_settings_with(|name| std::env::var(name).ok())
    }

    pub(super) fn to_settings_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<CompletionSettings, ConfigValidationError> {
        let kind = self.parse_backend()?;
        let mut settings = CompletionSettings::new(kind, self.model_name(kind));
        settings.base_url = self.base_url.clone();
        settings.api_key = lookup(&self.api_key_env);
        settings.api_key_env = self.api_key_env.clone();
        settings.max_tokens = self.max_tokens;
        settings.temperature = self.temperature;
        Ok(settings)
    }

    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_request_timeout(Duration::from_secs(self.timeout_secs))
    }
}
