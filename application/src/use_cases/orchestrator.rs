//! Task orchestrator
//!
//! Holds one [`RunTaskUseCase`] run per task id, each on its own tokio task
//! with a child cancellation token. Runs share the memory store, the
//! completion service and the executor (with its research cache); nothing
//! here is process-global, so dropping the orchestrator after
//! [`shutdown`](TaskOrchestrator::shutdown) releases everything.

use crate::config::OrchestratorConfig;
use crate::ports::lifecycle::{CompositeNotifier, LifecycleNotifier};
use crate::services::memory::MemoryStore;
use crate::use_cases::run_task::{RunTaskError, RunTaskOutput, RunTaskUseCase};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use taskpilot_domain::{HistoryEntry, LifecycleEvent, Task, TaskId, TaskStatus};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Task is already running: {0}")]
    AlreadyRunning(TaskId),

    #[error("Run of task {0} was already awaited")]
    AlreadyAwaited(TaskId),

    #[error("Run of task {task_id} panicked or was aborted: {message}")]
    Join { task_id: TaskId, message: String },

    #[error(transparent)]
    Run(#[from] RunTaskError),
}

/// What a status query reports
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatusView {
    pub status: TaskStatus,
    /// Completed share of the latest plan, 0–100
    pub progress: f64,
    /// Title of the step in progress, or the next runnable one
    pub current_step: Option<String>,
    pub last_activity: DateTime<Utc>,
}

/// Timestamps of the last lifecycle event per task
#[derive(Default)]
pub struct ActivityTracker {
    last_seen: Mutex<HashMap<TaskId, DateTime<Utc>>>,
}

impl ActivityTracker {
    pub fn touch(&self, task_id: &TaskId) {
        self.last_seen.lock().insert(task_id.clone(), Utc::now());
    }

    pub fn last_activity(&self, task_id: &TaskId) -> Option<DateTime<Utc>> {
        self.last_seen.lock().get(task_id).copied()
    }

    pub fn forget(&self, task_id: &TaskId) {
        self.last_seen.lock().remove(task_id);
    }
}

impl LifecycleNotifier for ActivityTracker {
    fn notify(&self, event: &LifecycleEvent) {
        self.touch(event.task_id());
    }
}

struct TaskRun {
    token: CancellationToken,
    handle: Option<JoinHandle<Result<RunTaskOutput, RunTaskError>>>,
}

impl TaskRun {
    fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }
}

pub struct TaskOrchestrator {
    use_case: RunTaskUseCase,
    memory: Arc<MemoryStore>,
    config: OrchestratorConfig,
    activity: Arc<ActivityTracker>,
    runs: Mutex<HashMap<TaskId, TaskRun>>,
    shutdown: CancellationToken,
}

impl TaskOrchestrator {
    pub fn new(use_case: RunTaskUseCase, config: OrchestratorConfig) -> Self {
        let activity = Arc::new(ActivityTracker::default());
        let notifier = CompositeNotifier::new(vec![use_case.notifier(), activity.clone()]);
        let memory = use_case.memory().clone();
        Self {
            use_case: use_case.with_notifier(Arc::new(notifier)),
            memory,
            config,
            activity,
            runs: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    /// Start a run for a new task.
    pub fn submit(
        &self,
        description: impl Into<String>,
        requirements: Vec<String>,
    ) -> Result<TaskId, OrchestratorError> {
        self.submit_task(Task::new(description).with_requirements(requirements))
    }

    /// Start a run for `task`; at most one run per task id is active.
    pub fn submit_task(&self, task: Task) -> Result<TaskId, OrchestratorError> {
        let task_id = task.id.clone();
        let mut runs = self.runs.lock();
        if runs.get(&task_id).is_some_and(|run| !run.is_finished()) {
            return Err(OrchestratorError::AlreadyRunning(task_id));
        }

        // visible to status queries before the loop starts
        self.memory.add_task(task.clone());
        self.activity.touch(&task_id);

        let token = self.shutdown.child_token();
        let use_case = self.use_case.clone().with_cancellation(token.clone());
        let handle = tokio::spawn(async move { use_case.execute(task).await });
        runs.insert(
            task_id.clone(),
            TaskRun {
                token,
                handle: Some(handle),
            },
        );
        info!(task_id = %task_id, "Task submitted");
        Ok(task_id)
    }

    pub fn status(&self, task_id: &TaskId) -> Result<TaskStatusView, OrchestratorError> {
        let task = self
            .memory
            .get_task(task_id)
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.clone()))?;
        let plan = self.memory.get_latest_plan_for_task(task_id);
        Ok(TaskStatusView {
            status: task.status,
            progress: plan.as_ref().map_or(0.0, |p| p.progress().percent),
            current_step: plan
                .as_ref()
                .and_then(|p| p.current_step())
                .map(|s| s.title.clone()),
            last_activity: self
                .activity
                .last_activity(task_id)
                .unwrap_or(task.updated_at),
        })
    }

    /// Request a stop and return the history recorded so far.
    ///
    /// The run notices the request between cycles.
    pub fn stop(&self, task_id: &TaskId) -> Result<Vec<HistoryEntry>, OrchestratorError> {
        {
            let runs = self.runs.lock();
            let run = runs
                .get(task_id)
                .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.clone()))?;
            run.token.cancel();
        }
        info!(task_id = %task_id, "Stop requested");
        Ok(self.memory.get_task_history(task_id, usize::MAX))
    }

    /// Wait for a run to end and take its output.
    pub async fn wait(&self, task_id: &TaskId) -> Result<RunTaskOutput, OrchestratorError> {
        let handle = {
            let mut runs = self.runs.lock();
            let run = runs
                .get_mut(task_id)
                .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.clone()))?;
            run.handle
                .take()
                .ok_or_else(|| OrchestratorError::AlreadyAwaited(task_id.clone()))?
        };
        let output = handle.await.map_err(|e| OrchestratorError::Join {
            task_id: task_id.clone(),
            message: e.to_string(),
        })??;
        Ok(output)
    }

    /// Purge finished runs idle for longer than `idle_timeout`; stop
    /// running ones that went quiet so a later sweep can purge them.
    ///
    /// Returns the purged task ids.
    pub fn sweep_idle(&self) -> Vec<TaskId> {
        let now = Utc::now();
        let idle_timeout =
            chrono::Duration::from_std(self.config.idle_timeout).unwrap_or(chrono::Duration::MAX);
        let mut purged = Vec::new();

        let mut runs = self.runs.lock();
        runs.retain(|task_id, run| {
            let last = self
                .activity
                .last_activity(task_id)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            if now - last < idle_timeout {
                return true;
            }
            if !run.is_finished() {
                warn!(task_id = %task_id, "Stopping idle run");
                run.token.cancel();
                return true;
            }
            purged.push(task_id.clone());
            false
        });
        drop(runs);

        for task_id in &purged {
            self.memory.purge_task(task_id);
            self.activity.forget(task_id);
            debug!(task_id = %task_id, "Purged idle task");
        }
        purged
    }

    /// Run [`sweep_idle`](Self::sweep_idle) every `sweep_interval` until
    /// [`shutdown`](Self::shutdown).
    pub fn spawn_idle_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        let period = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let purged = orchestrator.sweep_idle();
                        if !purged.is_empty() {
                            info!(count = purged.len(), "Idle sweep purged tasks");
                        }
                    }
                }
            }
        })
    }

    /// Stop every run and wait for them to end.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<(TaskId, JoinHandle<_>)> = self
            .runs
            .lock()
            .iter_mut()
            .filter_map(|(id, run)| run.handle.take().map(|h| (id.clone(), h)))
            .collect();
        for (task_id, handle) in handles {
            if let Err(e) = handle.await {
                warn!(task_id = %task_id, error = %e, "Run ended abnormally");
            }
        }
        info!("Orchestrator shut down");
    }
}
