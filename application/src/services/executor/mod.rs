//! Executor
//!
//! A closed registry from [`ActionKind`] to [`ActionHandler`]. `execute`
//! never returns an error: missing handlers, handler errors and handler
//! panics all become failed [`ActionResult`]s so the loop can continue.
//!
//! Handlers persist what they produce (artifacts, research records) through
//! the [`MemoryStore`] in the [`ExecutionContext`] and list it in the
//! returned [`ExecutionOutcome`].

mod code;
pub mod command_guard;
mod passthrough;
mod research;
mod unblock;

pub use code::CodeHandler;
pub use command_guard::CommandGuard;
pub use passthrough::{BrowseHandler, ComputerHandler, FileHandler};
pub use research::ResearchHandler;
pub use unblock::UnblockHandler;

use crate::config::AgentConfig;
use crate::ports::browser::Browser;
use crate::ports::collaborator_error::CollaboratorError;
use crate::ports::computer::ComputerControl;
use crate::ports::file_system::FileSystem;
use crate::services::completion::{CompletionError, CompletionService};
use crate::services::memory::MemoryStore;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use taskpilot_domain::action::error_kind;
use taskpilot_domain::{Action, ActionError, ActionKind, ActionResult, Artifact, ExecutionOutcome};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Collaborators and settings available to handlers
#[derive(Clone)]
pub struct ExecutionContext {
    pub completion: Arc<CompletionService>,
    pub memory: Arc<MemoryStore>,
    pub browser: Option<Arc<dyn Browser>>,
    pub file_system: Option<Arc<dyn FileSystem>>,
    pub computer: Option<Arc<dyn ComputerControl>>,
    pub config: AgentConfig,
}

impl ExecutionContext {
    pub fn new(completion: Arc<CompletionService>, memory: Arc<MemoryStore>) -> Self {
        Self {
            completion,
            memory,
            browser: None,
            file_system: None,
            computer: None,
            config: AgentConfig::default(),
        }
    }

    // ==================== Builder Methods ====================

    pub fn with_browser(mut self, browser: Arc<dyn Browser>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn with_file_system(mut self, file_system: Arc<dyn FileSystem>) -> Self {
        self.file_system = Some(file_system);
        self
    }

    pub fn with_computer(mut self, computer: Arc<dyn ComputerControl>) -> Self {
        self.computer = Some(computer);
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }
}

/// What a successful handler hands back
#[derive(Debug, Clone, Default)]
pub struct HandlerOutput {
    pub payload: Value,
    pub artifacts: Vec<Artifact>,
}

impl HandlerOutput {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            artifacts: Vec::new(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<Artifact>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("{capability} failed")]
    Collaborator {
        capability: &'static str,
        #[source]
        source: CollaboratorError,
    },

    #[error("No {0} collaborator configured")]
    MissingCollaborator(&'static str),

    #[error("Command blocked by pattern `{pattern}`: {command}")]
    BlockedCommand { command: String, pattern: String },

    #[error("Invalid payload for {kind}: expected {expected}")]
    InvalidPayload {
        kind: ActionKind,
        expected: &'static str,
    },

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub(crate) fn collaborator(capability: &'static str) -> impl FnOnce(CollaboratorError) -> Self {
        move |source| HandlerError::Collaborator { capability, source }
    }

    pub(crate) fn invalid_payload(action: &Action, expected: &'static str) -> Self {
        HandlerError::InvalidPayload {
            kind: action.kind,
            expected,
        }
    }

    pub fn error_kind(&self) -> &'static str {
        match self {
            HandlerError::Completion(e) => e.error_kind(),
            HandlerError::Collaborator { .. } => error_kind::COLLABORATOR_FAILED,
            HandlerError::MissingCollaborator(_) => error_kind::COLLABORATOR_UNAVAILABLE,
            HandlerError::BlockedCommand { .. } => error_kind::BLOCKED_COMMAND,
            HandlerError::InvalidPayload { .. } => error_kind::INVALID_PAYLOAD,
            HandlerError::Failed(_) => error_kind::EXECUTION_FAILED,
        }
    }

    /// Convert into the error carried by a failed result; the source chain
    /// becomes the detail.
    pub fn into_action_error(self) -> ActionError {
        let mut chain = Vec::new();
        let mut source = std::error::Error::source(&self);
        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }
        let error = ActionError::new(self.error_kind(), self.to_string());
        if chain.is_empty() {
            error
        } else {
            error.with_detail(chain.join("\ncaused by: "))
        }
    }
}

/// One action kind's implementation
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(
        &self,
        action: &Action,
        context: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError>;
}

pub struct Executor {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::with_default_handlers(CommandGuard::default())
    }
}

impl Executor {
    /// Registry without any handler
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// All built-in handlers; `guard` screens computer-control commands.
    pub fn with_default_handlers(guard: CommandGuard) -> Self {
        let code: Arc<dyn ActionHandler> = Arc::new(CodeHandler);
        Self::empty()
            .register(ActionKind::Research, Arc::new(ResearchHandler::new()))
            .register(ActionKind::GenerateCode, code.clone())
            .register(ActionKind::Architecture, code.clone())
            .register(ActionKind::Testing, code.clone())
            .register(ActionKind::Deployment, code)
            .register(ActionKind::UnblockPlan, Arc::new(UnblockHandler))
            .register(ActionKind::Browse, Arc::new(BrowseHandler))
            .register(ActionKind::FileOperation, Arc::new(FileHandler))
            .register(ActionKind::ComputerControl, Arc::new(ComputerHandler::new(guard)))
    }

    pub fn register(mut self, kind: ActionKind, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn has_handler(&self, kind: ActionKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Run `action` and normalize whatever happens into an outcome.
    pub async fn execute(&self, action: Action, context: &ExecutionContext) -> ExecutionOutcome {
        let Some(handler) = self.handlers.get(&action.kind) else {
            warn!(kind = %action.kind, "No handler registered");
            let error = ActionError::new(
                error_kind::UNSUPPORTED_ACTION_TYPE,
                format!("Unsupported action type: {}", action.kind),
            );
            return ExecutionOutcome {
                result: ActionResult::failure(&action, error),
                action,
                artifacts: Vec::new(),
            };
        };

        debug!(action_id = %action.id, kind = %action.kind, "Executing action");
        let run = AssertUnwindSafe(handler.handle(&action, context)).catch_unwind();
        match run.await {
            Ok(Ok(output)) => ExecutionOutcome {
                result: ActionResult::success(&action, output.payload),
                action,
                artifacts: output.artifacts,
            },
            Ok(Err(err)) => {
                warn!(action_id = %action.id, kind = %action.kind, error = %err, "Action failed");
                ExecutionOutcome {
                    result: ActionResult::failure(&action, err.into_action_error()),
                    action,
                    artifacts: Vec::new(),
                }
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(action_id = %action.id, kind = %action.kind, %message, "Handler panicked");
                let error = ActionError::new(
                    error_kind::HANDLER_PANIC,
                    format!("Handler for {} panicked", action.kind),
                )
                .with_detail(message);
                ExecutionOutcome {
                    result: ActionResult::failure(&action, error),
                    action,
                    artifacts: Vec::new(),
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ports::completion_backend::BackendError;
    use crate::services::completion::tests::{ScriptedBackend, fast_policy};
    use taskpilot_domain::{
        CodeRequest, CompletionRequest, CompletionResponse, FileOperation, TaskId,
    };

    pub(crate) fn context(backend: ScriptedBackend) -> ExecutionContext {
        let completion = CompletionService::new(Arc::new(backend), fast_policy(0));
        ExecutionContext::new(Arc::new(completion), Arc::new(MemoryStore::new()))
    }

    struct PanickingHandler;

    #[async_trait]
    impl ActionHandler for PanickingHandler {
        async fn handle(
            &self,
            _action: &Action,
            _context: &ExecutionContext,
        ) -> Result<HandlerOutput, HandlerError> {
            panic!("handler exploded");
        }
    }

    #[tokio::test]
    async fn test_unregistered_kind_is_a_failed_result() {
        let executor = Executor::default();
        assert!(!executor.has_handler(ActionKind::Completion));
        let action = Action::completion(TaskId::new("t"), CompletionRequest::default());

        let outcome = executor
            .execute(action, &context(ScriptedBackend::texts(&[])))
            .await;
        assert!(!outcome.result.is_success());
        assert_eq!(
            outcome.result.error_kind(),
            Some(error_kind::UNSUPPORTED_ACTION_TYPE)
        );
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let executor = Executor::empty().register(ActionKind::Research, Arc::new(PanickingHandler));
        let action = Action::research(TaskId::new("t"), "r", Default::default());

        let outcome = executor
            .execute(action, &context(ScriptedBackend::texts(&[])))
            .await;
        let error = outcome.result.error.unwrap();
        assert_eq!(error.kind, error_kind::HANDLER_PANIC);
        assert_eq!(error.detail.as_deref(), Some("handler exploded"));
    }

    #[tokio::test]
    async fn test_quota_error_becomes_failed_result_without_retry() {
        let backend = ScriptedBackend::new(vec![
            Err(BackendError::QuotaExceeded("insufficient_quota".into())),
            Ok(CompletionResponse::Raw("unused".into())),
        ]);
        let completion = Arc::new(CompletionService::new(Arc::new(backend), fast_policy(3)));
        let ctx = ExecutionContext::new(completion.clone(), Arc::new(MemoryStore::new()));
        let action = Action::code(
            ActionKind::GenerateCode,
            TaskId::new("t"),
            "build",
            CodeRequest::default(),
        );

        let outcome = Executor::default().execute(action, &ctx).await;
        let error = outcome.result.error.unwrap();
        assert_eq!(error.kind, error_kind::QUOTA_EXHAUSTED);
        assert!(error.message.contains("insufficient_quota"));
        assert!(!completion.is_available());
    }

    #[tokio::test]
    async fn test_missing_collaborator() {
        let action = Action::file(
            TaskId::new("t"),
            FileOperation::Read {
                path: "README.md".into(),
            },
        );
        let outcome = Executor::default()
            .execute(action, &context(ScriptedBackend::texts(&[])))
            .await;
        assert_eq!(
            outcome.result.error_kind(),
            Some(error_kind::COLLABORATOR_UNAVAILABLE)
        );
    }

    #[test]
    fn test_collaborator_error_detail_carries_source() {
        let err = HandlerError::collaborator("file write")(CollaboratorError::PermissionDenied(
            "/etc/passwd".into(),
        ));
        let action_error = err.into_action_error();
        assert_eq!(action_error.kind, error_kind::COLLABORATOR_FAILED);
        assert!(action_error.detail.unwrap().contains("/etc/passwd"));
    }
}
