//! Ollama chat backend

use super::{CompletionSettings, into_response, status_error, transport_error};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskpilot_application::{BackendError, CompletionBackend};
use taskpilot_domain::{CompletionOptions, CompletionResponse};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize, Default)]
struct ModelOptions<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: ModelOptions<'a>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<MessageResponse>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: String,
}

pub struct OllamaBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl OllamaBackend {
    pub fn new(client: reqwest::Client, settings: &CompletionSettings) -> Self {
        let base = settings.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Self {
            client,
            endpoint: format!("{}/api/chat", base.trim_end_matches('/')),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }

    fn request<'a>(&'a self, prompt: &'a str, options: &'a CompletionOptions) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = options.system_prompt.as_deref() {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: prompt,
        });

        ChatRequest {
            model: options.model.as_deref().unwrap_or(&self.model),
            messages,
            stream: false,
            format: options.wants_json().then_some("json"),
            options: ModelOptions {
                temperature: options.temperature.or(self.temperature),
                top_p: options.top_p,
                num_predict: options.max_tokens.or(self.max_tokens),
                stop: &options.stop,
            },
        }
    }
}

fn parse_body(body: ChatResponse) -> Result<String, BackendError> {
    if let Some(error) = body.error {
        return Err(BackendError::Other(error));
    }
    body.message
        .map(|m| m.content)
        .ok_or_else(|| BackendError::InvalidResponse("response has no message".into()))
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, BackendError> {
        let request = self.request(prompt, options);
        debug!(model = request.model, bytes = prompt.len(), "Sending Ollama chat");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        Ok(into_response(parse_body(body)?, options.wants_json()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::BackendKind;

    #[test]
    fn test_request_shape() {
        let mut settings = CompletionSettings::new(BackendKind::Ollama, "llama3.1");
        settings.temperature = Some(0.2);
        let backend = OllamaBackend::new(reqwest::Client::new(), &settings);
        assert_eq!(backend.endpoint, "http://localhost:11434/api/chat");

        let options = CompletionOptions::default().json().with_stop("###");
        let value = serde_json::to_value(backend.request("hello", &options)).unwrap();
        assert_eq!(value["model"], "llama3.1");
        assert_eq!(value["stream"], false);
        assert_eq!(value["format"], "json");
        assert_eq!(value["messages"].as_array().unwrap().len(), 1);
        assert!((value["options"]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(value["options"]["stop"][0], "###");
    }

    #[test]
    fn test_parse_body() {
        let ok: ChatResponse =
            serde_json::from_str(r#"{"message": {"role": "assistant", "content": "hi"}, "done": true}"#)
                .unwrap();
        assert_eq!(parse_body(ok).unwrap(), "hi");

        let err: ChatResponse = serde_json::from_str(r#"{"error": "model not found"}"#).unwrap();
        assert_eq!(
            parse_body(err).unwrap_err(),
            BackendError::Other("model not found".into())
        );
    }
}
