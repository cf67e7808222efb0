//! Domain layer for taskpilot
//!
//! Entities and value objects of the agent control loop. No I/O lives here.
//!
//! # Core Concepts
//!
//! - **Task**: a unit of work described in natural language
//! - **Plan**: a versioned, dependency-ordered step graph for a task
//! - **Action**: one cycle's typed request to the executor, with its result
//! - **Reflection**: whether the plan is still viable after a result
//! - **Artifact**: code, documents and reports produced along the way
//!
//! Model output is untrusted text; [`structured`] turns it into data with a
//! layered extraction that never fails the caller.

pub mod action;
pub mod artifact;
pub mod completion;
pub mod core;
pub mod event;
pub mod perception;
pub mod plan;
pub mod prompt;
pub mod reflection;
pub mod structured;
pub mod task;

// Re-export commonly used types
pub use action::{
    Action, ActionError, ActionKind, ActionPayload, ActionResult, BlockedStep, BrowseRequest,
    CodeRequest, CompletionRequest, ComputerCommand, ExecutionOutcome, FileOperation,
    HistoryEntry, ResearchRequest, ResultStatus, UnblockRequest, error_kind,
};
pub use artifact::{Artifact, ArtifactKind};
pub use completion::{CompletionOptions, CompletionResponse, ResponseFormat};
pub use core::{
    error::DomainError,
    ids::{ActionId, ArtifactId, PlanId, ReflectionId, ResultId, StepId, TaskId},
};
pub use event::{EventRecord, LifecycleEvent};
pub use perception::{
    EnvironmentInfo, FileEntry, PlanSnapshot, RelevantFile, Screenshot, StepSummary, WorldState,
};
pub use plan::{
    Complexity, Plan, PlanProgress, PlanStatus, Remediation, RemediationKind, Step, StepStatus,
    StepType, UnblockProposal,
};
pub use prompt::PromptTemplate;
pub use reflection::{FinalReport, Reflection, ReflectionSource};
pub use structured::{CodeBlock, ExtractionFailure};
pub use task::{Task, TaskStatus};
