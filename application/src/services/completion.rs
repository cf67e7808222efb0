//! Completion service
//!
//! Uniform `complete(prompt, options)` over one [`CompletionBackend`] with:
//!
//! - a wall-clock timeout per backend request,
//! - exponential backoff for retryable errors,
//! - no retries for terminal errors (auth, bad request),
//! - a quota latch: the first rate-limit/quota error disables the service for
//!   the rest of the run so callers switch to non-completion behavior.
//!
//! The service never parses structured output; callers run
//! [`taskpilot_domain::structured`] on the response.

use crate::config::RetryPolicy;
use crate::ports::completion_backend::{BackendError, CompletionBackend, ErrorClass};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use taskpilot_domain::action::error_kind;
use taskpilot_domain::{CompletionOptions, CompletionResponse};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("Completion failed after {attempts} attempt(s): {source}")]
    Backend {
        #[source]
        source: BackendError,
        attempts: u32,
    },

    #[error("Completion service disabled after quota exhaustion")]
    Disabled,
}

impl CompletionError {
    /// Quota errors and calls made after the latch was set
    pub fn is_quota_exhausted(&self) -> bool {
        match self {
            CompletionError::Disabled => true,
            CompletionError::Backend { source, .. } => {
                source.classification() == ErrorClass::QuotaExhausted
            }
        }
    }

    /// Tag used on failed action results
    pub fn error_kind(&self) -> &'static str {
        if self.is_quota_exhausted() {
            error_kind::QUOTA_EXHAUSTED
        } else {
            error_kind::COMPLETION_FAILED
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            CompletionError::Backend { attempts, .. } => *attempts,
            CompletionError::Disabled => 0,
        }
    }
}

/// Resilient front for a completion backend; safe for concurrent use.
pub struct CompletionService {
    backend: Arc<dyn CompletionBackend>,
    policy: RetryPolicy,
    defaults: CompletionOptions,
    quota_exhausted: AtomicBool,
}

impl CompletionService {
    pub fn new(backend: Arc<dyn CompletionBackend>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            policy,
            defaults: CompletionOptions::default(),
            quota_exhausted: AtomicBool::new(false),
        }
    }

    /// Options applied when a request leaves a field unset
    pub fn with_defaults(mut self, defaults: CompletionOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// False once a quota/rate-limit error has been seen
    pub fn is_available(&self) -> bool {
        !self.quota_exhausted.load(Ordering::SeqCst)
    }

    fn merged(&self, options: &CompletionOptions) -> CompletionOptions {
        CompletionOptions {
            model: options.model.clone().or_else(|| self.defaults.model.clone()),
            max_tokens: options.max_tokens.or(self.defaults.max_tokens),
            temperature: options.temperature.or(self.defaults.temperature),
            top_p: options.top_p.or(self.defaults.top_p),
            stop: if options.stop.is_empty() {
                self.defaults.stop.clone()
            } else {
                options.stop.clone()
            },
            response_format: options.response_format,
            system_prompt: options
                .system_prompt
                .clone()
                .or_else(|| self.defaults.system_prompt.clone()),
        }
    }

    async fn attempt(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, BackendError> {
        match tokio::time::timeout(
            self.policy.request_timeout,
            self.backend.complete(prompt, options),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout),
        }
    }

    /// Send `prompt`, retrying transient failures.
    pub async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, CompletionError> {
        if !self.is_available() {
            return Err(CompletionError::Disabled);
        }

        let options = self.merged(options);
        let mut attempt: u32 = 0;
        loop {
            match self.attempt(prompt, &options).await {
                Ok(response) => {
                    debug!(
                        backend = self.backend.name(),
                        attempt = attempt + 1,
                        "Completion succeeded"
                    );
                    return Ok(response);
                }
                Err(err) => {
                    let attempts = attempt + 1;
                    match err.classification() {
                        ErrorClass::QuotaExhausted => {
                            warn!(
                                backend = self.backend.name(),
                                error = %err,
                                "Quota exhausted; disabling completions for this run"
                            );
                            self.quota_exhausted.store(true, Ordering::SeqCst);
                            return Err(CompletionError::Backend {
                                source: err,
                                attempts,
                            });
                        }
                        ErrorClass::Terminal => {
                            warn!(backend = self.backend.name(), error = %err, "Terminal completion error");
                            return Err(CompletionError::Backend {
                                source: err,
                                attempts,
                            });
                        }
                        ErrorClass::Retryable if attempt < self.policy.max_retries => {
                            let delay = self.policy.delay_for(attempt);
                            warn!(
                                backend = self.backend.name(),
                                attempt = attempts,
                                max_retries = self.policy.max_retries,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "Completion failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        ErrorClass::Retryable => {
                            return Err(CompletionError::Backend {
                                source: err,
                                attempts,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Text-only convenience
    pub async fn complete_text(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        Ok(self.complete(prompt, options).await?.into_text())
    }

    /// Same as [`complete`](Self::complete) with the JSON hint set.
    pub async fn complete_structured(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse, CompletionError> {
        let options = options.clone().json();
        self.complete(prompt, &options).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Backend that pops scripted results in order and records prompts
    pub(crate) struct ScriptedBackend {
        responses: Mutex<VecDeque<Result<CompletionResponse, BackendError>>>,
        pub(crate) prompts: Mutex<Vec<String>>,
        pub(crate) options: Mutex<Vec<CompletionOptions>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new(responses: Vec<Result<CompletionResponse, BackendError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                prompts: Mutex::new(Vec::new()),
                options: Mutex::new(Vec::new()),
            }
        }

        /// Backend answering each prompt with the given texts in order
        pub(crate) fn texts(texts: &[&str]) -> Self {
            Self::new(
                texts
                    .iter()
                    .map(|t| Ok(CompletionResponse::Raw(t.to_string())))
                    .collect(),
            )
        }

        pub(crate) fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            prompt: &str,
            options: &CompletionOptions,
        ) -> Result<CompletionResponse, BackendError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.options.lock().unwrap().push(options.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(CompletionResponse::Raw("(no more responses)".to_string())))
        }
    }

    /// Never answers within any reasonable timeout
    struct HangingBackend;

    #[async_trait]
    impl CompletionBackend for HangingBackend {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn complete(
            &self,
            _prompt: &str,
            _options: &CompletionOptions,
        ) -> Result<CompletionResponse, BackendError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(CompletionResponse::Raw(String::new()))
        }
    }

    pub(crate) fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_until_success() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(BackendError::Timeout),
            Err(BackendError::Server {
                status: 503,
                message: "busy".into(),
            }),
            Ok(CompletionResponse::Raw("done".into())),
        ]));
        let service = CompletionService::new(backend.clone(), fast_policy(3));

        let text = service
            .complete_text("hi", &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "done");
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_retry_count_is_bounded() {
        let backend = Arc::new(ScriptedBackend::new(
            (0..10).map(|_| Err(BackendError::Transport("reset".into()))).collect(),
        ));
        let service = CompletionService::new(backend.clone(), fast_policy(2));

        let err = service
            .complete("hi", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.attempts(), 3);
        assert_eq!(backend.calls(), 3);
        assert!(service.is_available());
    }

    #[tokio::test]
    async fn test_terminal_error_is_not_retried() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(BackendError::Authentication(
            "invalid api key".into(),
        ))]));
        let service = CompletionService::new(backend.clone(), fast_policy(3));

        let err = service
            .complete("hi", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(backend.calls(), 1);
        assert!(err.to_string().contains("invalid api key"));
        assert!(!err.is_quota_exhausted());
    }

    #[tokio::test]
    async fn test_quota_error_latches_service() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(BackendError::QuotaExceeded("insufficient_quota".into())),
            Ok(CompletionResponse::Raw("never reached".into())),
        ]));
        let service = CompletionService::new(backend.clone(), fast_policy(3));

        let err = service
            .complete("hi", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_quota_exhausted());
        assert_eq!(err.error_kind(), error_kind::QUOTA_EXHAUSTED);
        assert_eq!(backend.calls(), 1);
        assert!(!service.is_available());

        let err = service
            .complete("again", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, CompletionError::Disabled);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_request_timeout_counts_as_retryable() {
        let service = CompletionService::new(
            Arc::new(HangingBackend),
            fast_policy(1).with_request_timeout(Duration::from_millis(20)),
        );
        let err = service
            .complete("hi", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CompletionError::Backend {
                source: BackendError::Timeout,
                attempts: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_defaults_fill_unset_options() {
        let backend = Arc::new(ScriptedBackend::texts(&["ok"]));
        let service = CompletionService::new(backend.clone(), fast_policy(0)).with_defaults(
            CompletionOptions::default()
                .with_model("default-model")
                .with_max_tokens(100),
        );

        service
            .complete_structured("hi", &CompletionOptions::default().with_max_tokens(5))
            .await
            .unwrap();
        let sent = backend.options.lock().unwrap()[0].clone();
        assert_eq!(sent.model.as_deref(), Some("default-model"));
        assert_eq!(sent.max_tokens, Some(5));
        assert!(sent.wants_json());
    }
}
