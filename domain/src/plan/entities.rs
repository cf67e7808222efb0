//! Plan and step entities

use crate::core::error::DomainError;
use crate::core::ids::{PlanId, StepId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// Kind of work a step represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Research,
    Architecture,
    #[default]
    Implementation,
    Testing,
    Deployment,
}

impl StepType {
    pub fn as_str(&self) -> &str {
        match self {
            StepType::Research => "research",
            StepType::Architecture => "architecture",
            StepType::Implementation => "implementation",
            StepType::Testing => "testing",
            StepType::Deployment => "deployment",
        }
    }
}

impl FromStr for StepType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "research" | "investigation" => Ok(StepType::Research),
            "architecture" | "design" => Ok(StepType::Architecture),
            "implementation" | "implement" | "coding" | "code" => Ok(StepType::Implementation),
            "testing" | "test" | "tests" => Ok(StepType::Testing),
            "deployment" | "deploy" => Ok(StepType::Deployment),
            other => Err(DomainError::UnknownVariant {
                kind: "step type",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a step
///
/// Within one plan a step only moves `pending → in_progress → {completed, blocked}`.
/// Blocked steps stay in the plan; a revision supersedes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl StepStatus {
    pub fn as_str(&self) -> &str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Blocked => "blocked",
        }
    }

    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::InProgress)
                | (StepStatus::InProgress, StepStatus::Completed)
                | (StepStatus::InProgress, StepStatus::Blocked)
        )
    }
}

impl FromStr for StepStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "pending" | "todo" => Ok(StepStatus::Pending),
            "in_progress" | "inprogress" | "active" => Ok(StepStatus::InProgress),
            "completed" | "complete" | "done" => Ok(StepStatus::Completed),
            "blocked" => Ok(StepStatus::Blocked),
            other => Err(DomainError::UnknownVariant {
                kind: "step status",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rough size estimate attached to a step by the planner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
}

impl Complexity {
    /// Lenient parse: unknown values map to `Medium`
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" | "simple" | "easy" | "1" | "2" => Complexity::Low,
            "high" | "complex" | "hard" | "4" | "5" => Complexity::High,
            _ => Complexity::Medium,
        }
    }
}

/// One unit of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub dependencies: Vec<StepId>,
    pub status: StepStatus,
    pub estimated_complexity: Complexity,
}

impl Step {
    pub fn new(id: impl Into<StepId>, title: impl Into<String>, step_type: StepType) -> Self {
        let title = title.into();
        Self {
            id: id.into(),
            description: title.clone(),
            title,
            step_type,
            dependencies: Vec::new(),
            status: StepStatus::Pending,
            estimated_complexity: Complexity::Medium,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_dependency(mut self, step_id: impl Into<StepId>) -> Self {
        self.dependencies.push(step_id.into());
        self
    }

    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.estimated_complexity = complexity;
        self
    }

    fn transition(&mut self, next: StepStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::transition("step", self.status, next));
        }
        self.status = next;
        Ok(())
    }
}

/// Status of a plan version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// The plan the loop is currently executing (one per task)
    #[default]
    Active,
    /// Replaced by a newer revision
    Superseded,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PlanStatus::Active => "active",
            PlanStatus::Superseded => "superseded",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
        }
    }
}

/// Aggregate progress over a plan's steps
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PlanProgress {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub blocked: usize,
    /// Completed share in percent, 0–100
    pub percent: f64,
}

/// A dependency-ordered decomposition of a task into steps.
///
/// Plans are versioned values: a revision creates a new `Plan` whose
/// `previous_plan_id` points at the plan it replaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub task_id: TaskId,
    pub title: String,
    pub description: String,
    pub steps: Vec<Step>,
    pub status: PlanStatus,
    pub previous_plan_id: Option<PlanId>,
    pub revision_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// Creates an active plan; step ids and dependency references are normalized.
    pub fn new(
        task_id: TaskId,
        title: impl Into<String>,
        description: impl Into<String>,
        steps: Vec<Step>,
    ) -> Self {
        Self {
            id: PlanId::generate(),
            task_id,
            title: title.into(),
            description: description.into(),
            steps: normalize_steps(steps),
            status: PlanStatus::Active,
            previous_plan_id: None,
            revision_reason: None,
            created_at: Utc::now(),
        }
    }

    /// Builds the next version of this plan with a fresh id.
    ///
    /// The returned plan is active; the caller is responsible for marking
    /// `self` as superseded.
    pub fn revise(&self, steps: Vec<Step>, reason: impl Into<String>) -> Plan {
        Plan {
            id: PlanId::generate(),
            task_id: self.task_id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            steps: normalize_steps(steps),
            status: PlanStatus::Active,
            previous_plan_id: Some(self.id.clone()),
            revision_reason: Some(reason.into()),
            created_at: Utc::now(),
        }
    }

    pub fn supersede(&mut self) {
        self.status = PlanStatus::Superseded;
    }

    /// Close the plan when its task ends.
    pub fn close(&mut self, succeeded: bool) {
        self.status = if succeeded {
            PlanStatus::Completed
        } else {
            PlanStatus::Failed
        };
    }

    pub fn is_active(&self) -> bool {
        self.status == PlanStatus::Active
    }

    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }

    fn step_mut(&mut self, id: &StepId) -> Result<&mut Step, DomainError> {
        self.steps
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| DomainError::StepNotFound(id.to_string()))
    }

    fn is_completed(&self, id: &StepId) -> bool {
        self.step(id)
            .is_some_and(|s| s.status == StepStatus::Completed)
    }

    /// Steps still waiting to run, in insertion order
    pub fn pending_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
    }

    /// Whether every dependency of `step` is completed
    pub fn dependencies_met(&self, step: &Step) -> bool {
        step.dependencies.iter().all(|dep| self.is_completed(dep))
    }

    /// Pending steps whose dependencies are all completed, in insertion order
    pub fn runnable_steps(&self) -> impl Iterator<Item = &Step> {
        self.pending_steps().filter(|s| self.dependencies_met(s))
    }

    /// Pending steps that cannot run because a dependency is not completed
    pub fn dependency_blocked_steps(&self) -> impl Iterator<Item = &Step> {
        self.pending_steps().filter(|s| !self.dependencies_met(s))
    }

    /// Dependencies of `step` that are not completed yet
    pub fn missing_dependencies(&self, step: &Step) -> Vec<StepId> {
        step.dependencies
            .iter()
            .filter(|dep| !self.is_completed(dep))
            .cloned()
            .collect()
    }

    /// First in-progress step, else the first runnable step
    pub fn current_step(&self) -> Option<&Step> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::InProgress)
            .or_else(|| self.runnable_steps().next())
    }

    /// pending → in_progress
    pub fn start_step(&mut self, id: &StepId) -> Result<(), DomainError> {
        self.step_mut(id)?.transition(StepStatus::InProgress)
    }

    /// in_progress → completed
    pub fn complete_step(&mut self, id: &StepId) -> Result<(), DomainError> {
        self.step_mut(id)?.transition(StepStatus::Completed)
    }

    /// in_progress → blocked
    pub fn block_step(&mut self, id: &StepId) -> Result<(), DomainError> {
        self.step_mut(id)?.transition(StepStatus::Blocked)
    }

    pub fn progress(&self) -> PlanProgress {
        let count = |status: StepStatus| self.steps.iter().filter(|s| s.status == status).count();
        let total = self.steps.len();
        let completed = count(StepStatus::Completed);
        let percent = if total == 0 {
            0.0
        } else {
            (completed as f64 / total as f64) * 100.0
        };
        PlanProgress {
            total,
            completed,
            pending: count(StepStatus::Pending),
            in_progress: count(StepStatus::InProgress),
            blocked: count(StepStatus::Blocked),
            percent,
        }
    }

    /// One-line-per-step rendering used inside prompts
    pub fn to_prompt_context(&self) -> String {
        let steps = self
            .steps
            .iter()
            .map(|s| {
                let deps = if s.dependencies.is_empty() {
                    String::new()
                } else {
                    format!(
                        " (depends on: {})",
                        s.dependencies
                            .iter()
                            .map(StepId::as_str)
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                };
                format!(
                    "- [{}] {} ({}): {}{}\n  {}",
                    s.status, s.id, s.step_type, s.title, deps, s.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        format!("Plan: {}\n{}\n\nSteps:\n{}", self.title, self.description, steps)
    }
}

/// Enforce the plan invariants on a freshly built step list.
///
/// - The first step with a given id keeps it; later duplicates get a
///   numeric suffix (`step-1`, `step-1-2`, ...) that no step in the list
///   uses, so dependencies on explicit ids keep their target.
/// - Dependencies that do not resolve to a step in the list are dropped.
/// - Self-dependencies are dropped.
pub fn normalize_steps(steps: Vec<Step>) -> Vec<Step> {
    let mut taken: HashSet<StepId> = steps.iter().map(|s| s.id.clone()).collect();
    let mut seen: HashSet<StepId> = HashSet::new();
    let mut steps: Vec<Step> = steps
        .into_iter()
        .map(|mut step| {
            if seen.contains(&step.id) {
                let base = step.id.as_str().to_string();
                let mut n = 2;
                let mut candidate = StepId::new(format!("{}-{}", base, n));
                while taken.contains(&candidate) {
                    n += 1;
                    candidate = StepId::new(format!("{}-{}", base, n));
                }
                taken.insert(candidate.clone());
                step.id = candidate;
            }
            seen.insert(step.id.clone());
            step
        })
        .collect();

    for step in &mut steps {
        let own = step.id.clone();
        let mut kept: Vec<StepId> = Vec::new();
        for dep in step.dependencies.drain(..) {
            if dep != own && seen.contains(&dep) && !kept.contains(&dep) {
                kept.push(dep);
            }
        }
        step.dependencies = kept;
    }
    steps
}
