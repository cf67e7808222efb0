//! Planner
//!
//! Turns a task into a step graph and, each cycle, decides what to do next:
//!
//! 1. no pending steps → `completion`
//! 2. first runnable step (insertion order) → the action for its type
//! 3. nothing runnable → `unblock_plan`, counting consecutive attempts
//! 4. attempts exhausted → forced progress: the blocked step with the fewest
//!    dependencies runs with its dependencies bypassed (or the task stops,
//!    per [`ForcedProgressPolicy`])
//!
//! Every completion call has a non-completion fallback so the loop is never
//! left without an active plan.

use crate::config::{AgentConfig, ForcedProgressPolicy};
use crate::services::completion::CompletionService;
use crate::services::memory::MemoryStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use taskpilot_domain::core::string::truncate;
use taskpilot_domain::plan::{carry_over, parse_plan_header, parse_steps};
use taskpilot_domain::structured::extract_from_response;
use taskpilot_domain::{
    Action, ActionKind, BlockedStep, CodeRequest, CompletionOptions, CompletionRequest, Plan,
    PromptTemplate, ResearchRequest, Step, StepId, StepStatus, StepType, Task, TaskId,
    UnblockProposal, UnblockRequest, WorldState,
};
use tracing::{debug, info, warn};

pub struct Planner {
    completion: Arc<CompletionService>,
    config: AgentConfig,
    /// Consecutive unblock attempts per task
    unblock_attempts: Mutex<HashMap<TaskId, u32>>,
}

impl Planner {
    pub fn new(completion: Arc<CompletionService>, config: AgentConfig) -> Self {
        Self {
            completion,
            config,
            unblock_attempts: Mutex::new(HashMap::new()),
        }
    }

    fn options() -> CompletionOptions {
        CompletionOptions::default().with_system(PromptTemplate::planner_system())
    }

    // ==================== Plan creation ====================

    /// Decompose `task` into steps; falls back to a one-step plan.
    pub async fn create_initial_plan(&self, task: &Task) -> Plan {
        match self.request_initial_plan(task).await {
            Some(plan) => {
                info!(
                    task_id = %task.id,
                    plan_id = %plan.id,
                    steps = plan.steps.len(),
                    "Initial plan created"
                );
                plan
            }
            None => {
                warn!(task_id = %task.id, "Falling back to a single-step plan");
                Self::single_step_plan(task)
            }
        }
    }

    async fn request_initial_plan(&self, task: &Task) -> Option<Plan> {
        let response = self
            .completion
            .complete_structured(&PromptTemplate::initial_plan(task), &Self::options())
            .await
            .map_err(|e| warn!(task_id = %task.id, error = %e, "Plan request failed"))
            .ok()?;
        let json = extract_from_response(&response)
            .map_err(|e| warn!(task_id = %task.id, error = %e, "Plan response was not structured"))
            .ok()?;
        let steps = parse_steps(&json, false)?;
        let header = parse_plan_header(&json);
        Some(Plan::new(
            task.id.clone(),
            header
                .title
                .unwrap_or_else(|| format!("Plan: {}", truncate(task.description(), 60))),
            header.description.unwrap_or_default(),
            steps,
        ))
    }

    /// The whole task as one implementation step.
    pub fn single_step_plan(task: &Task) -> Plan {
        let step = Step::new("step-1", truncate(task.description(), 80), StepType::Implementation)
            .with_description(task.to_prompt_context());
        Plan::new(
            task.id.clone(),
            format!("Plan: {}", truncate(task.description(), 60)),
            "Single-step fallback plan",
            vec![step],
        )
    }

    // ==================== Action selection ====================

    /// Choose the action for this cycle.
    pub fn determine_next_action(
        &self,
        task: &Task,
        state: &WorldState,
        plan: &Plan,
        memory: &MemoryStore,
    ) -> Action {
        if plan.pending_steps().next().is_none() {
            self.reset_unblock_attempts(&task.id);
            let progress = plan.progress();
            let mut summary = format!("{}/{} steps completed", progress.completed, progress.total);
            // failed steps left with nothing to run is a stall, not a finish
            let stalled_reason = (progress.blocked > 0).then(|| {
                summary.push_str(&format!(", {} blocked", progress.blocked));
                format!("{} step(s) failed and nothing is left to run", progress.blocked)
            });
            if stalled_reason.is_some() {
                warn!(task_id = %task.id, blocked = progress.blocked, "Only failed steps remain");
            }
            return Action::completion(
                task.id.clone(),
                CompletionRequest {
                    summary,
                    stalled_reason,
                },
            )
            .with_plan(plan.id.clone());
        }

        if let Some(step) = plan.runnable_steps().next() {
            self.reset_unblock_attempts(&task.id);
            debug!(task_id = %task.id, step_id = %step.id, "Selected runnable step");
            return self.action_for_step(task, state, plan, step, memory);
        }

        let previous = self.unblock_attempts(&task.id);
        let exhausted = previous >= self.config.unblock_threshold;
        // without completions there is nobody to ask for a fix
        if exhausted || !self.completion.is_available() {
            self.reset_unblock_attempts(&task.id);
            return self.force_progress(task, state, plan, memory);
        }

        let attempt = previous + 1;
        self.unblock_attempts.lock().insert(task.id.clone(), attempt);
        info!(task_id = %task.id, attempt, "No runnable step; requesting unblock analysis");

        let blocked = plan
            .dependency_blocked_steps()
            .map(|s| BlockedStep {
                step_id: s.id.clone(),
                title: s.title.clone(),
                description: s.description.clone(),
                missing_dependencies: plan.missing_dependencies(s),
            })
            .collect();
        Action::unblock(
            task.id.clone(),
            format!("Unblock plan (attempt {})", attempt),
            UnblockRequest {
                plan_context: plan.to_prompt_context(),
                blocked,
                attempt,
            },
        )
        .with_plan(plan.id.clone())
    }

    fn force_progress(
        &self,
        task: &Task,
        state: &WorldState,
        plan: &Plan,
        memory: &MemoryStore,
    ) -> Action {
        if self.config.forced_progress == ForcedProgressPolicy::Fail {
            warn!(task_id = %task.id, "Plan is stalled and forced progress is disabled");
            return Action::completion(
                task.id.clone(),
                CompletionRequest {
                    summary: format!("{}/{} steps completed", plan.progress().completed, plan.steps.len()),
                    stalled_reason: Some(format!(
                        "no runnable step after {} unblock attempts",
                        self.config.unblock_threshold
                    )),
                },
            )
            .with_plan(plan.id.clone());
        }

        // min_by_key keeps the first of equal minima, i.e. insertion order
        let step = plan
            .pending_steps()
            .min_by_key(|s| s.dependencies.len());
        match step {
            Some(step) => {
                warn!(
                    task_id = %task.id,
                    step_id = %step.id,
                    bypassed = ?plan.missing_dependencies(step),
                    "Forcing progress: executing step with dependencies bypassed"
                );
                self.action_for_step(task, state, plan, step, memory).forced()
            }
            // unreachable: callers only force when steps are pending
            None => Action::completion(task.id.clone(), CompletionRequest::default())
                .with_plan(plan.id.clone()),
        }
    }

    fn action_for_step(
        &self,
        task: &Task,
        state: &WorldState,
        plan: &Plan,
        step: &Step,
        memory: &MemoryStore,
    ) -> Action {
        let kind = ActionKind::for_step(step.step_type);
        let action = match kind {
            ActionKind::Research => {
                let mut queries = vec![step.title.clone()];
                if step.description != step.title {
                    queries.push(truncate(&step.description, 200));
                }
                queries.truncate(self.config.max_research_queries.max(1));
                Action::research(
                    task.id.clone(),
                    step.title.clone(),
                    ResearchRequest {
                        queries,
                        context: format!("{}\n\nStep: {}", task.to_prompt_context(), step.description),
                    },
                )
            }
            _ => {
                let dependency_artifacts = step
                    .dependencies
                    .iter()
                    .flat_map(|dep| memory.get_artifacts_for_step(&task.id, dep))
                    .collect();
                Action::code(
                    kind,
                    task.id.clone(),
                    step.title.clone(),
                    CodeRequest {
                        step_title: step.title.clone(),
                        step_description: step.description.clone(),
                        task_description: task.description().to_string(),
                        requirements: task.requirements.clone(),
                        dependency_artifacts,
                        project_structure: state.project_structure.clone().unwrap_or_default(),
                        relevant_code: state.relevant_code.clone(),
                    },
                )
            }
        };
        action.with_plan(plan.id.clone()).with_step(step.id.clone())
    }

    // ==================== Unblock bookkeeping ====================

    pub fn unblock_attempts(&self, task_id: &TaskId) -> u32 {
        self.unblock_attempts
            .lock()
            .get(task_id)
            .copied()
            .unwrap_or(0)
    }

    fn reset_unblock_attempts(&self, task_id: &TaskId) {
        self.unblock_attempts.lock().remove(task_id);
    }

    /// Drop per-task state once a run ends.
    pub fn forget(&self, task_id: &TaskId) {
        self.reset_unblock_attempts(task_id);
    }

    // ==================== Revision ====================

    /// Build the next version of `plan` from an unblock proposal.
    ///
    /// Returns `None` when the proposal references no step of the plan.
    pub fn apply_unblock_proposal(&self, plan: &Plan, proposal: &UnblockProposal) -> Option<Plan> {
        let steps = proposal.apply(plan)?;
        let reason = if proposal.analysis.is_empty() {
            "unblock".to_string()
        } else {
            format!("unblock: {}", truncate(&proposal.analysis, 200))
        };
        Some(plan.revise(steps, reason))
    }

    /// Ask for an updated step list; on failure append a recovery step.
    pub async fn revise_plan(&self, task: &Task, plan: &Plan, insights: &str) -> Plan {
        match self.request_revision(task, plan, insights).await {
            Some(steps) => {
                let revised = plan.revise(steps, truncate(insights, 200));
                info!(
                    task_id = %task.id,
                    plan_id = %revised.id,
                    previous_plan_id = %plan.id,
                    steps = revised.steps.len(),
                    "Plan revised"
                );
                revised
            }
            None => {
                warn!(task_id = %task.id, plan_id = %plan.id, "Revision unusable; adding recovery step");
                Self::recovery_revision(plan, insights)
            }
        }
    }

    async fn request_revision(&self, task: &Task, plan: &Plan, insights: &str) -> Option<Vec<Step>> {
        let response = self
            .completion
            .complete_structured(
                &PromptTemplate::revise_plan(task, plan, insights),
                &Self::options(),
            )
            .await
            .map_err(|e| warn!(task_id = %task.id, error = %e, "Revision request failed"))
            .ok()?;
        let json = extract_from_response(&response).ok()?;
        let proposed = parse_steps(&json, true)?;
        Some(merge_revision(plan, proposed))
    }

    /// Carry the plan over unchanged plus one recovery step the reset steps wait on.
    pub fn recovery_revision(plan: &Plan, insights: &str) -> Plan {
        let n = plan
            .steps
            .iter()
            .filter(|s| s.id.as_str().starts_with("recovery-"))
            .count()
            + 1;
        let recovery_id = StepId::new(format!("recovery-{}", n));
        let recovery = Step::new(
            recovery_id.clone(),
            "Recover from failed step",
            StepType::Implementation,
        )
        .with_description(format!(
            "The previous attempt did not succeed. Address the following before continuing:\n{}",
            truncate(insights, 500)
        ));

        let reset: Vec<StepId> = plan
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Blocked || s.status == StepStatus::InProgress)
            .map(|s| s.id.clone())
            .collect();
        let mut steps = carry_over(&plan.steps);
        for step in steps.iter_mut().filter(|s| reset.contains(&s.id)) {
            step.dependencies.push(recovery_id.clone());
        }
        steps.push(recovery);
        plan.revise(steps, format!("recovery: {}", truncate(insights, 200)))
    }
}

/// Reconcile a proposed step list with the current plan.
///
/// Echoed ids that were completed stay completed; everything else is pending.
/// Completed steps the model dropped are kept at the front so finished work
/// is never lost.
fn merge_revision(plan: &Plan, proposed: Vec<Step>) -> Vec<Step> {
    let completed: Vec<&Step> = plan
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Completed)
        .collect();

    let mut merged: Vec<Step> = completed
        .iter()
        .filter(|c| !proposed.iter().any(|p| p.id == c.id))
        .map(|c| (*c).clone())
        .collect();

    for mut step in proposed {
        step.status = if completed.iter().any(|c| c.id == step.id) {
            StepStatus::Completed
        } else {
            StepStatus::Pending
        };
        merged.push(step);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::completion::tests::{ScriptedBackend, fast_policy};
    use crate::ports::completion_backend::BackendError;
    use serde_json::json;
    use taskpilot_domain::{ActionPayload, Artifact, CompletionResponse};

    fn planner(backend: ScriptedBackend) -> Planner {
        planner_with(backend, AgentConfig::default())
    }

    fn planner_with(backend: ScriptedBackend, config: AgentConfig) -> Planner {
        let service = CompletionService::new(Arc::new(backend), fast_policy(0));
        Planner::new(Arc::new(service), config)
    }

    fn cyclic_plan(task: &Task) -> Plan {
        Plan::new(
            task.id.clone(),
            "cyclic",
            "",
            vec![
                Step::new("a", "A", StepType::Implementation)
                    .with_dependency("b")
                    .with_dependency("c"),
                Step::new("b", "B", StepType::Implementation).with_dependency("a"),
                Step::new("c", "C", StepType::Testing).with_dependency("b"),
            ],
        )
    }

    #[tokio::test]
    async fn test_initial_plan_from_structured_response() {
        let planner = planner(ScriptedBackend::new(vec![Ok(CompletionResponse::Structured(
            json!({
                "title": "Todo API",
                "steps": [
                    {"id": "s1", "title": "Research", "type": "research"},
                    {"id": "s2", "title": "Build", "type": "implementation", "dependencies": ["s1", "ghost"]}
                ]
            }),
        ))]));
        let task = Task::new("Build a todo API");

        let plan = planner.create_initial_plan(&task).await;
        assert_eq!(plan.title, "Todo API");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].dependencies, vec![StepId::new("s1")]);
    }

    #[tokio::test]
    async fn test_initial_plan_falls_back_to_single_step() {
        let planner = planner(ScriptedBackend::texts(&["Sure! Here is my plan: do it."]));
        let task = Task::new("Write a CLI that greets the user");

        let plan = planner.create_initial_plan(&task).await;
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].step_type, StepType::Implementation);
        assert!(plan.is_active());
    }

    #[tokio::test]
    async fn test_single_step_plan_is_runnable_then_completes() {
        let planner = planner(ScriptedBackend::texts(&[]));
        let task = Task::new("single step, no dependencies");
        let memory = MemoryStore::new();
        let mut plan = Planner::single_step_plan(&task);

        let action = planner.determine_next_action(&task, &WorldState::empty(), &plan, &memory);
        assert_eq!(action.kind, ActionKind::GenerateCode);
        assert_eq!(action.step_id, Some(StepId::new("step-1")));

        plan.start_step(&StepId::new("step-1")).unwrap();
        plan.complete_step(&StepId::new("step-1")).unwrap();
        let action = planner.determine_next_action(&task, &WorldState::empty(), &plan, &memory);
        assert!(action.is_completion());
    }

    #[test]
    fn test_only_failed_steps_left_is_a_stall() {
        let planner = planner(ScriptedBackend::texts(&[]));
        let task = Task::new("single step that fails");
        let memory = MemoryStore::new();
        let mut plan = Planner::single_step_plan(&task);
        plan.start_step(&StepId::new("step-1")).unwrap();
        plan.block_step(&StepId::new("step-1")).unwrap();

        let action = planner.determine_next_action(&task, &WorldState::empty(), &plan, &memory);
        let ActionPayload::Completion(request) = &action.payload else {
            panic!("expected completion payload");
        };
        assert!(request.stalled_reason.as_deref().unwrap().contains("1 step(s) failed"));
        assert_eq!(request.summary, "0/1 steps completed, 1 blocked");
    }

    #[test]
    fn test_dependent_step_waits_for_its_dependency() {
        let planner = planner(ScriptedBackend::texts(&[]));
        let task = Task::new("two steps");
        let memory = MemoryStore::new();
        let mut plan = Plan::new(
            task.id.clone(),
            "p",
            "",
            vec![
                Step::new("step1", "First", StepType::Research),
                Step::new("step2", "Second", StepType::Implementation).with_dependency("step1"),
            ],
        );
        memory.store_artifact(
            &Artifact::document(task.id.clone(), "findings").with_step(StepId::new("step1")),
        );

        let first = planner.determine_next_action(&task, &WorldState::empty(), &plan, &memory);
        assert_eq!(first.kind, ActionKind::Research);
        assert_eq!(first.step_id, Some(StepId::new("step1")));

        plan.start_step(&StepId::new("step1")).unwrap();
        let waiting = planner.determine_next_action(&task, &WorldState::empty(), &plan, &memory);
        assert_eq!(waiting.kind, ActionKind::UnblockPlan);

        plan.complete_step(&StepId::new("step1")).unwrap();
        let second = planner.determine_next_action(&task, &WorldState::empty(), &plan, &memory);
        assert_eq!(second.step_id, Some(StepId::new("step2")));
        let ActionPayload::Code(request) = &second.payload else {
            panic!("expected code payload");
        };
        assert_eq!(request.dependency_artifacts.len(), 1);
        assert_eq!(planner.unblock_attempts(&task.id), 0);
    }

    #[test]
    fn test_escape_valve_forces_fewest_dependency_step() {
        let planner = planner(ScriptedBackend::texts(&[]));
        let task = Task::new("cyclic");
        let plan = cyclic_plan(&task);
        let memory = MemoryStore::new();
        let state = WorldState::empty();

        for attempt in 1..=5 {
            let action = planner.determine_next_action(&task, &state, &plan, &memory);
            assert_eq!(action.kind, ActionKind::UnblockPlan);
            let ActionPayload::Unblock(request) = &action.payload else {
                panic!("expected unblock payload");
            };
            assert_eq!(request.attempt, attempt);
            assert_eq!(request.blocked.len(), 3);
        }

        let forced = planner.determine_next_action(&task, &state, &plan, &memory);
        assert!(forced.forced_progress);
        assert_eq!(forced.step_id, Some(StepId::new("b")));
        assert_eq!(planner.unblock_attempts(&task.id), 0);
    }

    #[test]
    fn test_fail_policy_stops_instead_of_forcing() {
        let planner = planner_with(
            ScriptedBackend::texts(&[]),
            AgentConfig::default()
                .with_unblock_threshold(1)
                .with_forced_progress(ForcedProgressPolicy::Fail),
        );
        let task = Task::new("cyclic");
        let plan = cyclic_plan(&task);
        let memory = MemoryStore::new();

        let first = planner.determine_next_action(&task, &WorldState::empty(), &plan, &memory);
        assert_eq!(first.kind, ActionKind::UnblockPlan);
        let second = planner.determine_next_action(&task, &WorldState::empty(), &plan, &memory);
        let ActionPayload::Completion(request) = &second.payload else {
            panic!("expected completion payload");
        };
        assert!(request.stalled_reason.is_some());
    }

    #[tokio::test]
    async fn test_unavailable_completions_force_progress_immediately() {
        let planner = planner(ScriptedBackend::new(vec![Err(BackendError::QuotaExceeded(
            "quota".into(),
        ))]));
        let task = Task::new("cyclic");
        // trips the quota latch
        planner.create_initial_plan(&task).await;

        let plan = cyclic_plan(&task);
        let action =
            planner.determine_next_action(&task, &WorldState::empty(), &plan, &MemoryStore::new());
        assert!(action.forced_progress);
    }

    #[tokio::test]
    async fn test_revision_preserves_completed_and_defaults_pending() {
        let planner = planner(ScriptedBackend::new(vec![Ok(CompletionResponse::Structured(
            json!({"steps": [
                {"id": "s2", "title": "Second, reworked", "status": "completed"},
                {"id": "s3", "title": "New step", "status": "in_progress"}
            ]}),
        ))]));
        let task = Task::new("t");
        let mut plan = Plan::new(
            task.id.clone(),
            "p",
            "",
            vec![
                Step::new("s1", "First", StepType::Research),
                Step::new("s2", "Second", StepType::Implementation),
            ],
        );
        plan.start_step(&StepId::new("s1")).unwrap();
        plan.complete_step(&StepId::new("s1")).unwrap();

        let revised = planner.revise_plan(&task, &plan, "s2 needs rework").await;
        assert_ne!(revised.id, plan.id);
        assert_eq!(revised.previous_plan_id, Some(plan.id.clone()));
        let statuses: Vec<_> = revised
            .steps
            .iter()
            .map(|s| (s.id.as_str(), s.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("s1", StepStatus::Completed),
                ("s2", StepStatus::Pending),
                ("s3", StepStatus::Pending),
            ]
        );
    }

    #[tokio::test]
    async fn test_revision_failure_appends_recovery_step() {
        let planner = planner(ScriptedBackend::texts(&["I cannot help with that."]));
        let task = Task::new("t");
        let mut plan = Plan::new(
            task.id.clone(),
            "p",
            "",
            vec![Step::new("s1", "Only", StepType::Implementation)],
        );
        plan.start_step(&StepId::new("s1")).unwrap();
        plan.block_step(&StepId::new("s1")).unwrap();

        let revised = planner.revise_plan(&task, &plan, "compile error").await;
        assert_eq!(revised.steps.len(), 2);
        assert_eq!(revised.steps[0].status, StepStatus::Pending);
        assert_eq!(revised.steps[0].dependencies, vec![StepId::new("recovery-1")]);
        assert_eq!(revised.steps[1].id.as_str(), "recovery-1");
        // the old version keeps the blocked step
        assert_eq!(plan.steps[0].status, StepStatus::Blocked);

        let memory = MemoryStore::new();
        let next =
            planner.determine_next_action(&task, &WorldState::empty(), &revised, &memory);
        assert_eq!(next.step_id, Some(StepId::new("recovery-1")));
    }

    #[test]
    fn test_apply_unblock_proposal() {
        let planner = planner(ScriptedBackend::texts(&[]));
        let task = Task::new("cyclic");
        let plan = cyclic_plan(&task);
        let proposal = UnblockProposal::from_json(&json!({
            "analysis": "a and b wait on each other",
            "remediations": [{"stepId": "b", "action": "modify", "newDependencies": []}]
        }))
        .unwrap();

        let revised = planner.apply_unblock_proposal(&plan, &proposal).unwrap();
        assert!(
            revised
                .revision_reason
                .as_deref()
                .unwrap()
                .starts_with("unblock:")
        );
        let memory = MemoryStore::new();
        let action =
            planner.determine_next_action(&task, &WorldState::empty(), &revised, &memory);
        assert_eq!(action.step_id, Some(StepId::new("b")));
    }
}
