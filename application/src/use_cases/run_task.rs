//! Run Task use case
//!
//! The per-task agent loop. Each cycle:
//!
//! | Phase       | Service                          |
//! |-------------|----------------------------------|
//! | 1. Perceive | [`Perceiver::perceive`]          |
//! | 2. Decide   | [`Planner::determine_next_action`] |
//! | 3. Execute  | [`Executor::execute`]            |
//! | 4. Record   | [`MemoryStore::store_result`]    |
//! | 5. Reflect  | [`Reflector::reflect`], then [`Planner::revise_plan`] if asked |
//!
//! The loop ends on a `completion` action, on exhausted failure credits, at
//! the iteration cap, or when the cancellation token fires. Cancellation is
//! observed between cycles; the result of a call in flight when it fires is
//! discarded.

use crate::config::{AgentConfig, PerceptionConfig};
use crate::ports::lifecycle::{LifecycleNotifier, NoLifecycleNotifier};
use crate::services::executor::{ExecutionContext, Executor, UnblockHandler};
use crate::services::memory::{MemoryError, MemoryStore};
use crate::services::perception::Perceiver;
use crate::services::planner::Planner;
use crate::services::reflector::Reflector;
use serde_json::json;
use std::sync::Arc;
use taskpilot_domain::{
    Action, ActionError, ActionKind, ActionPayload, ActionResult, Artifact, ArtifactKind,
    CompletionRequest, DomainError, FinalReport, HistoryEntry, LifecycleEvent, Plan, Reflection,
    ResearchRequest, StepStatus, Task, UnblockProposal, error_kind,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum RunTaskError {
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Output from the RunTask use case
#[derive(Debug, Clone)]
pub struct RunTaskOutput {
    /// Final state of the task
    pub task: Task,
    /// The plan in effect when the loop ended
    pub plan: Plan,
    /// Present when the task completed
    pub report: Option<FinalReport>,
    /// Every action of the task with its result, most recent first
    pub history: Vec<HistoryEntry>,
    pub iterations: usize,
    /// Whether the loop ended because a stop was requested
    pub stopped: bool,
}

/// Mutable state of one run
struct RunState {
    task: Task,
    plan: Plan,
    iterations: usize,
    consecutive_failures: usize,
    pending_proposal: Option<UnblockProposal>,
    report: Option<FinalReport>,
    stopped: bool,
}

/// Use case for driving one task to completion
#[derive(Clone)]
pub struct RunTaskUseCase {
    memory: Arc<MemoryStore>,
    planner: Arc<Planner>,
    executor: Arc<Executor>,
    perceiver: Arc<Perceiver>,
    reflector: Arc<Reflector>,
    context: ExecutionContext,
    config: AgentConfig,
    notifier: Arc<dyn LifecycleNotifier>,
    cancellation_token: Option<CancellationToken>,
}

impl RunTaskUseCase {
    /// Build the loop's services around the collaborators in `context`.
    pub fn new(context: ExecutionContext, executor: Arc<Executor>) -> Self {
        let config = context.config.clone();
        Self {
            memory: context.memory.clone(),
            planner: Arc::new(Planner::new(context.completion.clone(), config.clone())),
            executor,
            perceiver: Arc::new(Self::perceiver_for(&context, PerceptionConfig::default())),
            reflector: Arc::new(Reflector::new(context.completion.clone(), config.clone())),
            context,
            config,
            notifier: Arc::new(NoLifecycleNotifier),
            cancellation_token: None,
        }
    }

    fn perceiver_for(context: &ExecutionContext, config: PerceptionConfig) -> Perceiver {
        let mut perceiver = Perceiver::new(config);
        if let Some(fs) = &context.file_system {
            perceiver = perceiver.with_file_system(fs.clone());
        }
        if let Some(computer) = &context.computer {
            perceiver = perceiver.with_computer(computer.clone());
        }
        perceiver
    }

    // ==================== Builder Methods ====================

    pub fn with_perception(mut self, config: PerceptionConfig) -> Self {
        self.perceiver = Arc::new(Self::perceiver_for(&self.context, config));
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn LifecycleNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Set a cancellation token checked between cycles
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub(crate) fn notifier(&self) -> Arc<dyn LifecycleNotifier> {
        self.notifier.clone()
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation_token
            .as_ref()
            .is_some_and(|t| t.is_cancelled())
    }

    fn emit(&self, event: LifecycleEvent) {
        self.notifier.notify(&event);
    }

    // ==================== Loop ====================

    /// Run `task` until it completes, fails or is stopped.
    ///
    /// Only memory bookkeeping errors and rejected status transitions are
    /// returned as errors; everything that goes wrong inside a cycle is
    /// recorded as a failed result instead.
    pub async fn execute(&self, mut task: Task) -> Result<RunTaskOutput, RunTaskError> {
        task.activate()?;
        self.memory.add_task(task.clone());
        info!(task_id = %task.id, "Task started");
        self.emit(LifecycleEvent::TaskStarted {
            task_id: task.id.clone(),
            description: task.description().to_string(),
        });

        let plan = self.planner.create_initial_plan(&task).await;
        self.memory.store_plan(plan.clone());
        self.emit(LifecycleEvent::PlanCreated {
            task_id: task.id.clone(),
            plan_id: plan.id.clone(),
            step_count: plan.steps.len(),
        });

        let mut run = RunState {
            task,
            plan,
            iterations: 0,
            consecutive_failures: 0,
            pending_proposal: None,
            report: None,
            stopped: false,
        };

        while !run.task.status.is_terminal() {
            if self.is_cancelled() {
                self.stop(&mut run)?;
                break;
            }
            if run.iterations >= self.config.max_iterations {
                let error = format!("Iteration limit reached ({})", self.config.max_iterations);
                self.fail(&mut run, error)?;
                break;
            }
            run.iterations += 1;
            debug!(task_id = %run.task.id, iteration = run.iterations, "Cycle start");
            self.cycle(&mut run).await?;
        }

        self.planner.forget(&run.task.id);
        self.reflector.forget(&run.task.id);

        Ok(RunTaskOutput {
            history: self.memory.get_task_history(&run.task.id, usize::MAX),
            task: run.task,
            plan: run.plan,
            report: run.report,
            iterations: run.iterations,
            stopped: run.stopped,
        })
    }

    async fn cycle(&self, run: &mut RunState) -> Result<(), RunTaskError> {
        if let Some(proposal) = run.pending_proposal.take()
            && let Some(revised) = self.planner.apply_unblock_proposal(&run.plan, &proposal)
        {
            self.adopt_plan(run, revised);
        }
        if run.plan.pending_steps().next().is_none() && run.plan.progress().blocked > 0 {
            self.revise_failed_steps(run).await;
        }

        let state = self.perceiver.perceive(&self.memory, Some(&run.plan)).await;
        let action = self
            .planner
            .determine_next_action(&run.task, &state, &run.plan, &self.memory);
        self.memory.record_action(&action);
        self.emit(LifecycleEvent::ActionSelected {
            task_id: run.task.id.clone(),
            action_id: action.id.clone(),
            kind: action.kind,
            step_id: action.step_id.clone(),
            forced_progress: action.forced_progress,
        });

        if let ActionPayload::Completion(request) = &action.payload {
            return self.finish(run, &action, request).await;
        }

        if let Some(step_id) = &action.step_id {
            run.plan.start_step(step_id)?;
            self.memory.update_plan(&run.plan)?;
        }

        let outcome = self.executor.execute(action, &self.context).await;
        if self.is_cancelled() {
            info!(task_id = %run.task.id, "Stop requested; discarding in-flight result");
            return Ok(());
        }

        self.memory.store_result(&outcome.action, &outcome.result)?;
        let succeeded = outcome.result.is_success();
        if let Some(step_id) = &outcome.action.step_id {
            if succeeded {
                run.plan.complete_step(step_id)?;
            } else {
                run.plan.block_step(step_id)?;
            }
            self.memory.update_plan(&run.plan)?;
        }

        if succeeded {
            run.consecutive_failures = 0;
            self.emit(LifecycleEvent::ActionExecuted {
                task_id: run.task.id.clone(),
                action_id: outcome.action.id.clone(),
                kind: outcome.action.kind,
                artifact_count: outcome.artifacts.len(),
            });
            if outcome.action.kind == ActionKind::UnblockPlan {
                run.pending_proposal = outcome
                    .result
                    .payload
                    .as_ref()
                    .and_then(UnblockHandler::proposal_from_payload);
            }
        } else {
            let error = outcome
                .result
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown error".to_string());
            self.emit(LifecycleEvent::ActionFailed {
                task_id: run.task.id.clone(),
                action_id: outcome.action.id.clone(),
                kind: outcome.action.kind,
                error: error.clone(),
            });
            run.consecutive_failures += 1;
            warn!(
                task_id = %run.task.id,
                kind = %outcome.action.kind,
                failures = run.consecutive_failures,
                error = %error,
                "Action failed"
            );
            if run.consecutive_failures >= self.config.max_consecutive_failures {
                return self.fail(run, error);
            }
        }

        let latest = HistoryEntry {
            action: outcome.action,
            result: Some(outcome.result),
        };
        self.reflect(run, &latest).await
    }

    async fn reflect(&self, run: &mut RunState, latest: &HistoryEntry) -> Result<(), RunTaskError> {
        let reflection = self.reflector.reflect(&run.task, &run.plan, latest).await;
        self.memory.store_reflection(&reflection);
        self.emit(LifecycleEvent::ReflectionComplete {
            task_id: run.task.id.clone(),
            needs_plan_revision: reflection.needs_plan_revision,
            needs_research: reflection.needs_research,
            confidence: reflection.confidence,
        });

        let mut insights = reflection.revision_insights();
        if reflection.needs_research
            && let Some(findings) = self.follow_up_research(run, &reflection).await?
        {
            insights.push_str("\n\nResearch findings:\n");
            insights.push_str(&findings);
        }

        if reflection.needs_plan_revision && !self.is_cancelled() {
            let revised = self.planner.revise_plan(&run.task, &run.plan, &insights).await;
            if !self.is_cancelled() {
                self.adopt_plan(run, revised);
            }
        }
        Ok(())
    }

    /// Research the reflector asked for; returns the report text on success.
    async fn follow_up_research(
        &self,
        run: &RunState,
        reflection: &Reflection,
    ) -> Result<Option<String>, RunTaskError> {
        let action = Action::research(
            run.task.id.clone(),
            "Follow-up research",
            ResearchRequest {
                queries: reflection.research_queries.clone(),
                context: run.task.to_prompt_context(),
            },
        )
        .with_plan(run.plan.id.clone());
        self.memory.record_action(&action);
        self.emit(LifecycleEvent::ActionSelected {
            task_id: run.task.id.clone(),
            action_id: action.id.clone(),
            kind: action.kind,
            step_id: None,
            forced_progress: false,
        });

        let outcome = self.executor.execute(action, &self.context).await;
        if self.is_cancelled() {
            return Ok(None);
        }
        self.memory.store_result(&outcome.action, &outcome.result)?;
        if !outcome.result.is_success() {
            let error = outcome
                .result
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            self.emit(LifecycleEvent::ActionFailed {
                task_id: run.task.id.clone(),
                action_id: outcome.action.id.clone(),
                kind: outcome.action.kind,
                error,
            });
            return Ok(None);
        }
        self.emit(LifecycleEvent::ActionExecuted {
            task_id: run.task.id.clone(),
            action_id: outcome.action.id.clone(),
            kind: outcome.action.kind,
            artifact_count: outcome.artifacts.len(),
        });
        Ok(outcome
            .result
            .payload
            .as_ref()
            .and_then(|p| p.get("report"))
            .map(|report| match report.as_str() {
                Some(text) => text.to_string(),
                None => report.to_string(),
            }))
    }

    /// Only failed steps remain: give the plan one revision before the
    /// planner reports it stalled.
    async fn revise_failed_steps(&self, run: &mut RunState) {
        let failed: Vec<String> = run
            .plan
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Blocked)
            .map(|s| format!("{} ({})", s.title, s.id))
            .collect();
        info!(task_id = %run.task.id, failed = failed.len(), "Only failed steps remain; revising plan");
        let insights = format!(
            "These steps failed and nothing else is left to run: {}. \
             Revise the plan so the task can still be finished.",
            failed.join(", ")
        );
        let revised = self.planner.revise_plan(&run.task, &run.plan, &insights).await;
        if !self.is_cancelled() {
            self.adopt_plan(run, revised);
        }
    }

    fn adopt_plan(&self, run: &mut RunState, revised: Plan) {
        let previous_plan_id = run.plan.id.clone();
        self.memory.store_plan(revised.clone());
        info!(
            task_id = %run.task.id,
            plan_id = %revised.id,
            previous_plan_id = %previous_plan_id,
            "Adopted revised plan"
        );
        self.emit(LifecycleEvent::PlanRevised {
            task_id: run.task.id.clone(),
            plan_id: revised.id.clone(),
            previous_plan_id,
            reason: revised.revision_reason.clone().unwrap_or_default(),
        });
        run.plan = revised;
    }

    // ==================== Endings ====================

    async fn finish(
        &self,
        run: &mut RunState,
        action: &Action,
        request: &CompletionRequest,
    ) -> Result<(), RunTaskError> {
        if let Some(reason) = &request.stalled_reason {
            let error = ActionError::new(error_kind::PLAN_STALLED, reason.clone());
            self.memory
                .store_result(action, &ActionResult::failure(action, error))?;
            return self.fail(run, format!("Plan stalled: {}", reason));
        }

        let report = self
            .reflector
            .generate_final_report(&run.task, &run.plan, &self.memory)
            .await;
        self.memory
            .store_final_reflection(&Reflection::final_for(run.task.id.clone(), &report));
        self.memory.store_artifact(
            &Artifact::new(ArtifactKind::Report, run.task.id.clone())
                .with_content(report.to_markdown())
                .with_description(report.summary.clone()),
        );
        self.memory.store_result(
            action,
            &ActionResult::success(
                action,
                json!({"summary": request.summary, "report": report.summary}),
            ),
        )?;

        run.task.complete()?;
        self.memory.update_task(&run.task)?;
        run.plan.close(true);
        self.memory.update_plan(&run.plan)?;
        info!(task_id = %run.task.id, summary = %request.summary, "Task completed");
        self.emit(LifecycleEvent::TaskCompleted {
            task_id: run.task.id.clone(),
            summary: report.summary.clone(),
        });
        run.report = Some(report);
        Ok(())
    }

    fn fail(&self, run: &mut RunState, error: String) -> Result<(), RunTaskError> {
        warn!(task_id = %run.task.id, error = %error, "Task failed");
        run.task.fail(error.clone())?;
        self.memory.update_task(&run.task)?;
        run.plan.close(false);
        self.memory.update_plan(&run.plan)?;
        self.emit(LifecycleEvent::TaskFailed {
            task_id: run.task.id.clone(),
            error,
        });
        Ok(())
    }

    fn stop(&self, run: &mut RunState) -> Result<(), RunTaskError> {
        info!(task_id = %run.task.id, iterations = run.iterations, "Task stopped");
        run.task.fail("Stopped by request")?;
        self.memory.update_task(&run.task)?;
        run.stopped = true;
        self.emit(LifecycleEvent::TaskStopped {
            task_id: run.task.id.clone(),
            iterations: run.iterations,
        });
        Ok(())
    }
}
