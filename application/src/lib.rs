//! Application layer for taskpilot
//!
//! This crate contains the agent loop, its services, the ports adapters
//! implement, and application configuration. It depends only on the domain
//! layer.

pub mod config;
pub mod ports;
pub mod services;
pub mod use_cases;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::{AgentConfig, ForcedProgressPolicy, OrchestratorConfig, PerceptionConfig, RetryPolicy};
pub use ports::{
    browser::Browser,
    collaborator_error::CollaboratorError,
    completion_backend::{BackendError, CompletionBackend, ErrorClass},
    computer::ComputerControl,
    file_system::FileSystem,
    lifecycle::{CompositeNotifier, LifecycleNotifier, NoLifecycleNotifier},
    memory_persistence::{MemoryPersistence, PersistenceError},
    vector_index::VectorIndex,
};
pub use services::completion::{CompletionError, CompletionService};
pub use services::executor::{CommandGuard, ExecutionContext, Executor};
pub use services::memory::{MemoryError, MemoryStore};
pub use use_cases::orchestrator::{OrchestratorError, TaskOrchestrator, TaskStatusView};
pub use use_cases::run_task::{RunTaskError, RunTaskOutput, RunTaskUseCase};
