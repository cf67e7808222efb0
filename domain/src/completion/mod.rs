//! Completion request options and response values.
//!
//! Backends receive a prompt plus [`CompletionOptions`] and answer with a
//! [`CompletionResponse`]. A response to a JSON-hinted request is either an
//! already-structured value or raw text; turning raw text into structure is
//! the caller's job (see [`crate::structured`]).
//!
//! # Examples
//!
//! ```
//! use taskpilot_domain::completion::{CompletionOptions, CompletionResponse, ResponseFormat};
//!
//! let options = CompletionOptions::default().json().with_max_tokens(2048);
//! assert_eq!(options.response_format, ResponseFormat::Json);
//!
//! let response = CompletionResponse::Raw("plain text".to_string());
//! assert_eq!(response.as_text(), "plain text");
//! assert!(response.structured().is_none());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Requested response shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    /// Hint that the caller wants structured JSON
    Json,
}

/// Per-request options. `None` fields fall back to the backend's defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stop: Vec<String>,
    pub response_format: ResponseFormat,
    pub system_prompt: Option<String>,
}

impl CompletionOptions {
    pub fn json(mut self) -> Self {
        self.response_format = ResponseFormat::Json;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop.push(stop.into());
        self
    }

    pub fn wants_json(&self) -> bool {
        self.response_format == ResponseFormat::Json
    }
}

/// What a backend returned
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionResponse {
    /// The backend already produced structured data
    Structured(Value),
    /// Plain text
    Raw(String),
}

impl CompletionResponse {
    /// Text view of the response; structured values are serialized.
    pub fn as_text(&self) -> String {
        match self {
            CompletionResponse::Structured(v) => v.to_string(),
            CompletionResponse::Raw(s) => s.clone(),
        }
    }

    pub fn structured(&self) -> Option<&Value> {
        match self {
            CompletionResponse::Structured(v) => Some(v),
            CompletionResponse::Raw(_) => None,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            CompletionResponse::Structured(v) => v.to_string(),
            CompletionResponse::Raw(s) => s,
        }
    }
}

impl From<String> for CompletionResponse {
    fn from(s: String) -> Self {
        CompletionResponse::Raw(s)
    }
}
