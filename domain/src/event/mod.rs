//! Lifecycle notifications emitted by the agent loop.
//!
//! Transport layers relay these to clients; the JSONL event log writes them
//! one per line as `{"type": "planCreated", "timestamp": ..., ...}`.

use crate::action::ActionKind;
use crate::core::ids::{ActionId, PlanId, StepId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LifecycleEvent {
    TaskStarted {
        task_id: TaskId,
        description: String,
    },
    PlanCreated {
        task_id: TaskId,
        plan_id: PlanId,
        step_count: usize,
    },
    ActionSelected {
        task_id: TaskId,
        action_id: ActionId,
        kind: ActionKind,
        step_id: Option<StepId>,
        forced_progress: bool,
    },
    ActionExecuted {
        task_id: TaskId,
        action_id: ActionId,
        kind: ActionKind,
        artifact_count: usize,
    },
    ActionFailed {
        task_id: TaskId,
        action_id: ActionId,
        kind: ActionKind,
        error: String,
    },
    PlanRevised {
        task_id: TaskId,
        plan_id: PlanId,
        previous_plan_id: PlanId,
        reason: String,
    },
    ReflectionComplete {
        task_id: TaskId,
        needs_plan_revision: bool,
        needs_research: bool,
        confidence: f64,
    },
    TaskCompleted {
        task_id: TaskId,
        summary: String,
    },
    TaskFailed {
        task_id: TaskId,
        error: String,
    },
    TaskStopped {
        task_id: TaskId,
        iterations: usize,
    },
}

impl LifecycleEvent {
    /// Wire name of the event (`"planCreated"`, ...)
    pub fn event_type(&self) -> &'static str {
        match self {
            LifecycleEvent::TaskStarted { .. } => "taskStarted",
            LifecycleEvent::PlanCreated { .. } => "planCreated",
            LifecycleEvent::ActionSelected { .. } => "actionSelected",
            LifecycleEvent::ActionExecuted { .. } => "actionExecuted",
            LifecycleEvent::ActionFailed { .. } => "actionFailed",
            LifecycleEvent::PlanRevised { .. } => "planRevised",
            LifecycleEvent::ReflectionComplete { .. } => "reflectionComplete",
            LifecycleEvent::TaskCompleted { .. } => "taskCompleted",
            LifecycleEvent::TaskFailed { .. } => "taskFailed",
            LifecycleEvent::TaskStopped { .. } => "taskStopped",
        }
    }

    pub fn task_id(&self) -> &TaskId {
        match self {
            LifecycleEvent::TaskStarted { task_id, .. }
            | LifecycleEvent::PlanCreated { task_id, .. }
            | LifecycleEvent::ActionSelected { task_id, .. }
            | LifecycleEvent::ActionExecuted { task_id, .. }
            | LifecycleEvent::ActionFailed { task_id, .. }
            | LifecycleEvent::PlanRevised { task_id, .. }
            | LifecycleEvent::ReflectionComplete { task_id, .. }
            | LifecycleEvent::TaskCompleted { task_id, .. }
            | LifecycleEvent::TaskFailed { task_id, .. }
            | LifecycleEvent::TaskStopped { task_id, .. } => task_id,
        }
    }

    /// Whether this event ends the task's run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleEvent::TaskCompleted { .. }
                | LifecycleEvent::TaskFailed { .. }
                | LifecycleEvent::TaskStopped { .. }
        )
    }
}

/// An event stamped with its emission time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: LifecycleEvent,
}

impl EventRecord {
    pub fn now(event: LifecycleEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
