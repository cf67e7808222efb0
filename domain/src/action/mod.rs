//! Actions and their results
//!
//! An [`Action`] is one cycle's typed request to the executor. Its
//! [`ActionKind`] selects the handler; the [`ActionPayload`] carries exactly
//! what that handler needs. Every executed action yields one immutable
//! [`ActionResult`].

use crate::artifact::Artifact;
use crate::core::error::DomainError;
use crate::core::ids::{ActionId, PlanId, ResultId, StepId, TaskId};
use crate::perception::RelevantFile;
use crate::plan::StepType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Handler selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Research,
    GenerateCode,
    Architecture,
    Testing,
    Deployment,
    UnblockPlan,
    Completion,
    Browse,
    FileOperation,
    ComputerControl,
}

impl ActionKind {
    pub const ALL: [ActionKind; 10] = [
        ActionKind::Research,
        ActionKind::GenerateCode,
        ActionKind::Architecture,
        ActionKind::Testing,
        ActionKind::Deployment,
        ActionKind::UnblockPlan,
        ActionKind::Completion,
        ActionKind::Browse,
        ActionKind::FileOperation,
        ActionKind::ComputerControl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Research => "research",
            ActionKind::GenerateCode => "generate_code",
            ActionKind::Architecture => "architecture",
            ActionKind::Testing => "testing",
            ActionKind::Deployment => "deployment",
            ActionKind::UnblockPlan => "unblock_plan",
            ActionKind::Completion => "completion",
            ActionKind::Browse => "browse",
            ActionKind::FileOperation => "file_operation",
            ActionKind::ComputerControl => "computer_control",
        }
    }

    /// The action a runnable step of this type turns into
    pub fn for_step(step_type: StepType) -> Self {
        match step_type {
            StepType::Research => ActionKind::Research,
            StepType::Architecture => ActionKind::Architecture,
            StepType::Implementation => ActionKind::GenerateCode,
            StepType::Testing => ActionKind::Testing,
            StepType::Deployment => ActionKind::Deployment,
        }
    }

    /// Kinds whose handler asks the model for files
    pub fn produces_code(&self) -> bool {
        matches!(
            self,
            ActionKind::GenerateCode
                | ActionKind::Architecture
                | ActionKind::Testing
                | ActionKind::Deployment
        )
    }
}

impl FromStr for ActionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| DomainError::UnknownVariant {
                kind: "action kind",
                value: s.to_string(),
            })
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a research action
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub queries: Vec<String>,
    /// Task/step context used when synthesizing the report
    pub context: String,
}

/// Payload shared by the file-producing actions
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CodeRequest {
    pub step_title: String,
    pub step_description: String,
    pub task_description: String,
    pub requirements: Vec<String>,
    /// Artifacts produced by the steps this one depends on
    pub dependency_artifacts: Vec<Artifact>,
    pub project_structure: Vec<String>,
    pub relevant_code: Vec<RelevantFile>,
}

/// A pending step that cannot run, with what it is waiting for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedStep {
    pub step_id: StepId,
    pub title: String,
    pub description: String,
    pub missing_dependencies: Vec<StepId>,
}

/// Payload of an unblock action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnblockRequest {
    pub plan_context: String,
    pub blocked: Vec<BlockedStep>,
    /// 1-based count of consecutive unblock attempts for this task
    pub attempt: u32,
}

/// Payload of the terminal completion action
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub summary: String,
    /// Set when the loop stopped because the plan could not progress
    pub stalled_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BrowseRequest {
    Search { query: String, max_results: usize },
    Visit { url: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FileOperation {
    Read { path: String },
    Write { path: String, content: String },
    Delete { path: String },
    List { path: String, recursive: bool },
    CreateDirectory { path: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ComputerCommand {
    ExecuteCommand {
        command: String,
        working_dir: Option<String>,
    },
    Screenshot,
    SendInput {
        input: String,
    },
    ControlApp {
        app: String,
        operation: String,
    },
}

/// Type-specific data carried by an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "payload", content = "data", rename_all = "snake_case")]
pub enum ActionPayload {
    Research(ResearchRequest),
    Code(CodeRequest),
    Unblock(UnblockRequest),
    Completion(CompletionRequest),
    Browse(BrowseRequest),
    File(FileOperation),
    Computer(ComputerCommand),
}

/// One cycle's request to the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub kind: ActionKind,
    pub task_id: TaskId,
    pub plan_id: Option<PlanId>,
    pub step_id: Option<StepId>,
    pub description: String,
    /// Selected by the escape valve with its dependencies bypassed
    pub forced_progress: bool,
    pub payload: ActionPayload,
    pub created_at: DateTime<Utc>,
}

impl Action {
    fn build(kind: ActionKind, task_id: TaskId, description: String, payload: ActionPayload) -> Self {
        Self {
            id: ActionId::generate(),
            kind,
            task_id,
            plan_id: None,
            step_id: None,
            description,
            forced_progress: false,
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn research(task_id: TaskId, description: impl Into<String>, request: ResearchRequest) -> Self {
        Self::build(
            ActionKind::Research,
            task_id,
            description.into(),
            ActionPayload::Research(request),
        )
    }

    /// A file-producing action; `kind` must be one of the code kinds.
    pub fn code(
        kind: ActionKind,
        task_id: TaskId,
        description: impl Into<String>,
        request: CodeRequest,
    ) -> Self {
        debug_assert!(kind.produces_code());
        Self::build(kind, task_id, description.into(), ActionPayload::Code(request))
    }

    pub fn unblock(task_id: TaskId, description: impl Into<String>, request: UnblockRequest) -> Self {
        Self::build(
            ActionKind::UnblockPlan,
            task_id,
            description.into(),
            ActionPayload::Unblock(request),
        )
    }

    pub fn completion(task_id: TaskId, request: CompletionRequest) -> Self {
        let description = match &request.stalled_reason {
            Some(reason) => format!("Stop: {}", reason),
            None => "All steps finished".to_string(),
        };
        Self::build(
            ActionKind::Completion,
            task_id,
            description,
            ActionPayload::Completion(request),
        )
    }

    pub fn browse(task_id: TaskId, request: BrowseRequest) -> Self {
        let description = match &request {
            BrowseRequest::Search { query, .. } => format!("Search: {}", query),
            BrowseRequest::Visit { url } => format!("Visit: {}", url),
        };
        Self::build(ActionKind::Browse, task_id, description, ActionPayload::Browse(request))
    }

    pub fn file(task_id: TaskId, operation: FileOperation) -> Self {
        let description = format!("File operation: {}", operation_name(&operation));
        Self::build(
            ActionKind::FileOperation,
            task_id,
            description,
            ActionPayload::File(operation),
        )
    }

    pub fn computer(task_id: TaskId, command: ComputerCommand) -> Self {
        let description = match &command {
            ComputerCommand::ExecuteCommand { command, .. } => format!("Run: {}", command),
            ComputerCommand::Screenshot => "Take screenshot".to_string(),
            ComputerCommand::SendInput { .. } => "Send input".to_string(),
            ComputerCommand::ControlApp { app, operation } => format!("{} {}", operation, app),
        };
        Self::build(
            ActionKind::ComputerControl,
            task_id,
            description,
            ActionPayload::Computer(command),
        )
    }

    pub fn with_plan(mut self, plan_id: PlanId) -> Self {
        self.plan_id = Some(plan_id);
        self
    }

    pub fn with_step(mut self, step_id: StepId) -> Self {
        self.step_id = Some(step_id);
        self
    }

    pub fn forced(mut self) -> Self {
        self.forced_progress = true;
        self
    }

    pub fn is_completion(&self) -> bool {
        self.kind == ActionKind::Completion
    }
}

fn operation_name(op: &FileOperation) -> &'static str {
    match op {
        FileOperation::Read { .. } => "read",
        FileOperation::Write { .. } => "write",
        FileOperation::Delete { .. } => "delete",
        FileOperation::List { .. } => "list",
        FileOperation::CreateDirectory { .. } => "create_directory",
    }
}

/// Error tags attached to failed results
pub mod error_kind {
    pub const UNSUPPORTED_ACTION_TYPE: &str = "unsupported_action_type";
    pub const QUOTA_EXHAUSTED: &str = "quota_exhausted";
    pub const COMPLETION_FAILED: &str = "completion_failed";
    pub const COLLABORATOR_UNAVAILABLE: &str = "collaborator_unavailable";
    pub const COLLABORATOR_FAILED: &str = "collaborator_failed";
    pub const BLOCKED_COMMAND: &str = "blocked_command";
    pub const INVALID_PAYLOAD: &str = "invalid_payload";
    pub const HANDLER_PANIC: &str = "handler_panic";
    pub const EXECUTION_FAILED: &str = "execution_failed";
    pub const PLAN_STALLED: &str = "plan_stalled";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Failed,
}

/// Error carried by a failed result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionError {
    pub message: String,
    /// One of [`error_kind`]
    pub kind: String,
    /// Source chain or panic payload
    pub detail: Option<String>,
}

impl ActionError {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: kind.to_string(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

/// Outcome of executing one action; immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub id: ResultId,
    pub action_id: ActionId,
    pub task_id: TaskId,
    pub status: ResultStatus,
    pub payload: Option<Value>,
    pub error: Option<ActionError>,
    pub timestamp: DateTime<Utc>,
}

impl ActionResult {
    pub fn success(action: &Action, payload: Value) -> Self {
        Self {
            id: ResultId::generate(),
            action_id: action.id.clone(),
            task_id: action.task_id.clone(),
            status: ResultStatus::Success,
            payload: Some(payload),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(action: &Action, error: ActionError) -> Self {
        Self {
            id: ResultId::generate(),
            action_id: action.id.clone(),
            task_id: action.task_id.clone(),
            status: ResultStatus::Failed,
            payload: None,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    pub fn error_kind(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.kind.as_str())
    }

    /// Short rendering for prompts and logs
    pub fn summary(&self, max_len: usize) -> String {
        match (&self.status, &self.error, &self.payload) {
            (ResultStatus::Failed, Some(error), _) => format!("FAILED: {}", error),
            (_, _, Some(payload)) => {
                let text = payload.to_string();
                format!("OK: {}", crate::core::string::truncate(&text, max_len))
            }
            _ => "OK".to_string(),
        }
    }
}

/// What the executor returns for one action
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub action: Action,
    pub result: ActionResult,
    pub artifacts: Vec<Artifact>,
}

/// An action paired with its result (`None` while unresolved)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: Action,
    pub result: Option<ActionResult>,
}

impl HistoryEntry {
    pub fn to_prompt_line(&self) -> String {
        let outcome = self
            .result
            .as_ref()
            .map(|r| r.summary(200))
            .unwrap_or_else(|| "pending".to_string());
        format!("- [{}] {} => {}", self.action.kind, self.action.description, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_for_step() {
        assert_eq!(ActionKind::for_step(StepType::Implementation), ActionKind::GenerateCode);
        assert_eq!(ActionKind::for_step(StepType::Research), ActionKind::Research);
        assert!(ActionKind::Testing.produces_code());
        assert!(!ActionKind::UnblockPlan.produces_code());
    }

    #[test]
    fn test_kind_parse_roundtrip_names() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
        assert!("teleport".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_result_links_action() {
        let action = Action::research(TaskId::new("t"), "look around", ResearchRequest::default())
            .with_step(StepId::new("s1"));
        let ok = ActionResult::success(&action, json!({"summary": "done"}));
        assert!(ok.is_success());
        assert_eq!(ok.action_id, action.id);

        let failed = ActionResult::failure(
            &action,
            ActionError::new(error_kind::QUOTA_EXHAUSTED, "quota"),
        );
        assert_eq!(failed.error_kind(), Some("quota_exhausted"));
        assert!(failed.summary(50).starts_with("FAILED"));
    }

    #[test]
    fn test_completion_action_description() {
        let action = Action::completion(
            TaskId::new("t"),
            CompletionRequest {
                summary: String::new(),
                stalled_reason: Some("cycle".to_string()),
            },
        );
        assert!(action.is_completion());
        assert_eq!(action.description, "Stop: cycle");
    }

    #[test]
    fn test_history_line_pending() {
        let action = Action::browse(
            TaskId::new("t"),
            BrowseRequest::Visit {
                url: "https://example.com".to_string(),
            },
        );
        let entry = HistoryEntry {
            action,
            result: None,
        };
        assert!(entry.to_prompt_line().ends_with("=> pending"));
    }
}
