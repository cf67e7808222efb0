//! Task domain module
//!
//! A [`Task`] is the unit of work a caller submits. Its description is fixed
//! at submission; only the status moves, and only forward.

use crate::core::error::DomainError;
use crate::core::ids::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted, loop not started yet
    #[default]
    Idle,
    /// The agent loop is running cycles for this task
    Active,
    /// The plan finished and a final report was produced
    Completed,
    /// The loop gave up (failure credits, iteration cap, stall)
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Active => "active",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of work submitted by a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    description: String,
    /// Optional extra requirements supplied alongside the description
    pub requirements: Vec<String>,
    pub status: TaskStatus,
    /// Last error attached when the task failed
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::generate(),
            description: description.into(),
            requirements: Vec::new(),
            status: TaskStatus::Idle,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_requirement(mut self, requirement: impl Into<String>) -> Self {
        self.requirements.push(requirement.into());
        self
    }

    pub fn with_requirements(mut self, requirements: impl IntoIterator<Item = String>) -> Self {
        self.requirements.extend(requirements);
        self
    }

    /// The immutable natural-language description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// idle → active
    pub fn activate(&mut self) -> Result<(), DomainError> {
        self.transition(TaskStatus::Idle, TaskStatus::Active)
    }

    /// active → completed
    pub fn complete(&mut self) -> Result<(), DomainError> {
        self.transition(TaskStatus::Active, TaskStatus::Completed)
    }

    /// idle|active → failed, attaching the last error
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::transition("task", self.status, TaskStatus::Failed));
        }
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    fn transition(&mut self, from: TaskStatus, to: TaskStatus) -> Result<(), DomainError> {
        if self.status != from {
            return Err(DomainError::transition("task", self.status, to));
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Description plus requirements, formatted for prompts.
    pub fn to_prompt_context(&self) -> String {
        if self.requirements.is_empty() {
            return self.description.clone();
        }
        format!(
            "{}\n\nRequirements:\n- {}",
            self.description,
            self.requirements.join("\n- ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_lifecycle() {
        let mut task = Task::new("Build a todo app").with_requirement("Use SQLite");
        assert_eq!(task.status, TaskStatus::Idle);

        task.activate().unwrap();
        assert_eq!(task.status, TaskStatus::Active);

        task.complete().unwrap();
        assert!(task.status.is_terminal());
    }

    #[test]
    fn test_task_cannot_complete_from_idle() {
        let mut task = Task::new("x");
        assert!(task.complete().is_err());
        assert_eq!(task.status, TaskStatus::Idle);
    }

    #[test]
    fn test_task_fail_records_error() {
        let mut task = Task::new("x");
        task.activate().unwrap();
        task.fail("iteration cap reached").unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("iteration cap reached"));
        assert!(task.fail("again").is_err());
    }

    #[test]
    fn test_prompt_context_includes_requirements() {
        let task = Task::new("Build API").with_requirement("REST").with_requirement("JSON");
        let ctx = task.to_prompt_context();
        assert!(ctx.starts_with("Build API"));
        assert!(ctx.contains("- REST"));
        assert!(ctx.contains("- JSON"));
    }
}
