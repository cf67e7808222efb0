//! Memory store
//!
//! Owns every persisted entity of the agent loop. Tasks and plans are
//! mutable records keyed by id; actions, results, reflections, artifacts and
//! research records are append-only logs. Code artifacts are additionally
//! indexed by path (the "codebase view").
//!
//! The store is internally synchronized and shared by all concurrently
//! running tasks. When a [`MemoryPersistence`] is configured every store
//! operation is mirrored to it; mirror failures are logged, not returned.
//! Mirror writes run in order on a dedicated writer thread so blocking file
//! I/O never lands on a runtime worker; [`MemoryStore::flush`] waits for
//! the queued writes.

use crate::ports::memory_persistence::MemoryPersistence;
use crate::ports::vector_index::VectorIndex;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use taskpilot_domain::{
    Action, ActionId, ActionResult, Artifact, ArtifactId, ArtifactKind, HistoryEntry, Plan,
    PlanId, PlanStatus, Reflection, StepId, Task, TaskId,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Plan not found: {0}")]
    PlanNotFound(PlanId),

    #[error("Result already recorded for action {0}")]
    DuplicateResult(ActionId),
}

/// A stored research report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchRecord {
    pub id: ArtifactId,
    pub task_id: TaskId,
    pub queries: Vec<String>,
    pub report: Value,
    pub timestamp: DateTime<Utc>,
}

/// An artifact matched by semantic search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub artifact: Artifact,
    pub score: f32,
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<TaskId, Task>,
    plans: HashMap<PlanId, Plan>,
    /// Plan ids per task in creation order
    plan_order: HashMap<TaskId, Vec<PlanId>>,
    actions: Vec<Action>,
    action_index: HashMap<ActionId, usize>,
    results: Vec<ActionResult>,
    result_index: HashMap<ActionId, usize>,
    reflections: Vec<Reflection>,
    artifacts: Vec<Artifact>,
    /// path → index into `artifacts` of the latest code artifact
    codebase: BTreeMap<String, usize>,
    research: Vec<ResearchRecord>,
}

enum MirrorOp {
    Write {
        collection: &'static str,
        id: String,
        value: Value,
    },
    Flush(oneshot::Sender<()>),
}

/// Queue feeding the writer thread
struct PersistenceWriter {
    tx: mpsc::UnboundedSender<MirrorOp>,
}

impl PersistenceWriter {
    fn spawn(persistence: Arc<dyn MemoryPersistence>) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("memory-persistence".to_string())
            .spawn(move || {
                while let Some(op) = rx.blocking_recv() {
                    match op {
                        MirrorOp::Write {
                            collection,
                            id,
                            value,
                        } => {
                            if let Err(e) = persistence.persist(collection, &id, &value) {
                                warn!(collection, id = %id, error = %e, "Failed to persist memory record");
                            }
                        }
                        MirrorOp::Flush(done) => {
                            let _ = done.send(());
                        }
                    }
                }
            })?;
        Ok(Self { tx })
    }
}

pub struct MemoryStore {
    inner: RwLock<Inner>,
    persistence: Option<Arc<dyn MemoryPersistence>>,
    writer: Option<PersistenceWriter>,
    index: Option<Arc<dyn VectorIndex>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            persistence: None,
            writer: None,
            index: None,
        }
    }

    /// Mirror every store operation to `persistence`.
    ///
    /// If the writer thread cannot be started, writes happen inline.
    pub fn with_persistence(mut self, persistence: Arc<dyn MemoryPersistence>) -> Self {
        match PersistenceWriter::spawn(persistence.clone()) {
            Ok(writer) => self.writer = Some(writer),
            Err(e) => warn!(error = %e, "Persistence writer unavailable; writing inline"),
        }
        self.persistence = Some(persistence);
        self
    }

    /// Wait until every mirror write queued so far has been attempted.
    pub async fn flush(&self) {
        let Some(writer) = &self.writer else {
            return;
        };
        let (done, flushed) = oneshot::channel();
        if writer.tx.send(MirrorOp::Flush(done)).is_ok() {
            let _ = flushed.await;
        }
    }

    pub fn with_vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    fn mirror<T: Serialize>(&self, collection: &'static str, id: &str, value: &T) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(collection, id, error = %e, "Failed to serialize memory record");
                return;
            }
        };
        let op = MirrorOp::Write {
            collection,
            id: id.to_string(),
            value,
        };
        let op = match &self.writer {
            Some(writer) => match writer.tx.send(op) {
                Ok(()) => return,
                Err(mpsc::error::SendError(op)) => op,
            },
            None => op,
        };
        if let MirrorOp::Write {
            collection,
            id,
            value,
        } = op
            && let Err(e) = persistence.persist(collection, &id, &value)
        {
            warn!(collection, id = %id, error = %e, "Failed to persist memory record");
        }
    }

    // ==================== Tasks ====================

    pub fn add_task(&self, task: Task) {
        self.mirror("tasks", task.id.as_str(), &task);
        self.inner.write().tasks.insert(task.id.clone(), task);
    }

    pub fn update_task(&self, task: &Task) -> Result<(), MemoryError> {
        {
            let mut inner = self.inner.write();
            let slot = inner
                .tasks
                .get_mut(&task.id)
                .ok_or_else(|| MemoryError::TaskNotFound(task.id.clone()))?;
            *slot = task.clone();
        }
        self.mirror("tasks", task.id.as_str(), task);
        Ok(())
    }

    pub fn get_task(&self, id: &TaskId) -> Option<Task> {
        self.inner.read().tasks.get(id).cloned()
    }

    // ==================== Plans ====================

    /// Store a new plan version.
    ///
    /// If the plan is active, any other active plan of the same task is
    /// marked superseded so exactly one plan per task stays active.
    pub fn store_plan(&self, plan: Plan) -> PlanId {
        let id = plan.id.clone();
        let mut superseded = Vec::new();
        {
            let mut inner = self.inner.write();
            if plan.is_active()
                && let Some(order) = inner.plan_order.get(&plan.task_id).cloned()
            {
                for other_id in order {
                    if let Some(other) = inner.plans.get_mut(&other_id)
                        && other.is_active()
                        && other.id != id
                    {
                        other.supersede();
                        superseded.push(other.clone());
                    }
                }
            }
            let order = inner.plan_order.entry(plan.task_id.clone()).or_default();
            if !order.contains(&id) {
                order.push(id.clone());
            }
            inner.plans.insert(id.clone(), plan.clone());
        }
        for old in &superseded {
            debug!(plan_id = %old.id, "Plan superseded");
            self.mirror("plans", old.id.as_str(), old);
        }
        self.mirror("plans", id.as_str(), &plan);
        id
    }

    pub fn update_plan(&self, plan: &Plan) -> Result<(), MemoryError> {
        {
            let mut inner = self.inner.write();
            let slot = inner
                .plans
                .get_mut(&plan.id)
                .ok_or_else(|| MemoryError::PlanNotFound(plan.id.clone()))?;
            *slot = plan.clone();
        }
        self.mirror("plans", plan.id.as_str(), plan);
        Ok(())
    }

    pub fn get_plan(&self, id: &PlanId) -> Option<Plan> {
        self.inner.read().plans.get(id).cloned()
    }

    /// Most recently stored plan of the task
    pub fn get_latest_plan_for_task(&self, task_id: &TaskId) -> Option<Plan> {
        let inner = self.inner.read();
        inner
            .plan_order
            .get(task_id)
            .and_then(|order| order.last())
            .and_then(|id| inner.plans.get(id))
            .cloned()
    }

    pub fn get_active_plan(&self, task_id: &TaskId) -> Option<Plan> {
        let inner = self.inner.read();
        inner
            .plan_order
            .get(task_id)?
            .iter()
            .rev()
            .filter_map(|id| inner.plans.get(id))
            .find(|p| p.status == PlanStatus::Active)
            .cloned()
    }

    /// Version chain of the latest plan, newest first
    pub fn get_plan_history(&self, task_id: &TaskId) -> Vec<Plan> {
        let inner = self.inner.read();
        let mut chain = Vec::new();
        let mut next = inner
            .plan_order
            .get(task_id)
            .and_then(|order| order.last())
            .cloned();
        while let Some(id) = next {
            let Some(plan) = inner.plans.get(&id) else {
                break;
            };
            next = plan.previous_plan_id.clone();
            chain.push(plan.clone());
        }
        chain
    }

    // ==================== Actions & results ====================

    /// Log an action at selection time; its result may follow later.
    pub fn record_action(&self, action: &Action) {
        {
            let mut inner = self.inner.write();
            if inner.action_index.contains_key(&action.id) {
                return;
            }
            let position = inner.actions.len();
            inner.action_index.insert(action.id.clone(), position);
            inner.actions.push(action.clone());
        }
        self.mirror("actions", action.id.as_str(), action);
    }

    /// Append the result of `action` (recording the action too if needed).
    pub fn store_result(&self, action: &Action, result: &ActionResult) -> Result<(), MemoryError> {
        self.record_action(action);
        {
            let mut inner = self.inner.write();
            if inner.result_index.contains_key(&action.id) {
                return Err(MemoryError::DuplicateResult(action.id.clone()));
            }
            let position = inner.results.len();
            inner.result_index.insert(action.id.clone(), position);
            inner.results.push(result.clone());
        }
        self.mirror("results", result.id.as_str(), result);
        Ok(())
    }

    fn history_where(&self, limit: usize, keep: impl Fn(&Action) -> bool) -> Vec<HistoryEntry> {
        let inner = self.inner.read();
        inner
            .actions
            .iter()
            .rev()
            .filter(|a| keep(a))
            .take(limit)
            .map(|action| HistoryEntry {
                action: action.clone(),
                result: inner
                    .result_index
                    .get(&action.id)
                    .map(|&i| inner.results[i].clone()),
            })
            .collect()
    }

    /// Last `limit` actions across all tasks with their results, most recent first
    pub fn get_recent_history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.history_where(limit, |_| true)
    }

    /// Same as [`get_recent_history`](Self::get_recent_history) for one task
    pub fn get_task_history(&self, task_id: &TaskId, limit: usize) -> Vec<HistoryEntry> {
        self.history_where(limit, |a| &a.task_id == task_id)
    }

    pub fn get_results_for_task(&self, task_id: &TaskId) -> Vec<ActionResult> {
        self.inner
            .read()
            .results
            .iter()
            .filter(|r| &r.task_id == task_id)
            .cloned()
            .collect()
    }

    // ==================== Reflections ====================

    pub fn store_reflection(&self, reflection: &Reflection) {
        self.inner.write().reflections.push(reflection.clone());
        self.mirror("reflections", reflection.id.as_str(), reflection);
    }

    /// Store the reflection summarizing a finished task.
    pub fn store_final_reflection(&self, reflection: &Reflection) {
        let mut reflection = reflection.clone();
        reflection.is_final = true;
        self.store_reflection(&reflection);
    }

    pub fn get_reflections(&self, task_id: &TaskId) -> Vec<Reflection> {
        self.inner
            .read()
            .reflections
            .iter()
            .filter(|r| &r.task_id == task_id)
            .cloned()
            .collect()
    }

    // ==================== Artifacts ====================

    pub fn store_artifact(&self, artifact: &Artifact) {
        {
            let mut inner = self.inner.write();
            let position = inner.artifacts.len();
            if artifact.is_code()
                && let Some(path) = &artifact.path
            {
                inner.codebase.insert(path.clone(), position);
            }
            inner.artifacts.push(artifact.clone());
        }
        if let (Some(index), Some(content)) = (&self.index, &artifact.content) {
            let text = match &artifact.path {
                Some(path) => format!("{}\n{}", path, content),
                None => content.clone(),
            };
            index.index(artifact.id.as_str(), &text);
        }
        self.mirror("artifacts", artifact.id.as_str(), artifact);
    }

    pub fn get_artifacts_for_task(&self, task_id: &TaskId) -> Vec<Artifact> {
        self.inner
            .read()
            .artifacts
            .iter()
            .filter(|a| &a.task_id == task_id)
            .cloned()
            .collect()
    }

    pub fn get_artifacts_for_step(&self, task_id: &TaskId, step_id: &StepId) -> Vec<Artifact> {
        self.inner
            .read()
            .artifacts
            .iter()
            .filter(|a| &a.task_id == task_id && a.step_id.as_ref() == Some(step_id))
            .cloned()
            .collect()
    }

    /// Latest code artifact per path, ordered by path
    pub fn get_codebase(&self) -> Vec<Artifact> {
        let inner = self.inner.read();
        inner
            .codebase
            .values()
            .map(|&i| inner.artifacts[i].clone())
            .collect()
    }

    pub fn get_codebase_paths(&self) -> Vec<String> {
        self.inner.read().codebase.keys().cloned().collect()
    }

    // ==================== Research ====================

    /// Store a research report; it is also kept as a research artifact,
    /// which is returned.
    pub fn store_research_results(
        &self,
        task_id: &TaskId,
        step_id: Option<&StepId>,
        queries: &[String],
        report: &Value,
    ) -> Artifact {
        let content = report
            .get("summary")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| report.to_string());
        let mut artifact = Artifact::new(ArtifactKind::Research, task_id.clone())
            .with_content(content)
            .with_description(queries.join("; "));
        if let Some(step_id) = step_id {
            artifact = artifact.with_step(step_id.clone());
        }
        let record = ResearchRecord {
            id: artifact.id.clone(),
            task_id: task_id.clone(),
            queries: queries.to_vec(),
            report: report.clone(),
            timestamp: Utc::now(),
        };
        self.inner.write().research.push(record.clone());
        self.mirror("research", record.id.as_str(), &record);
        self.store_artifact(&artifact);
        artifact
    }

    pub fn get_research_for_task(&self, task_id: &TaskId) -> Vec<ResearchRecord> {
        self.inner
            .read()
            .research
            .iter()
            .filter(|r| &r.task_id == task_id)
            .cloned()
            .collect()
    }

    // ==================== Search & cleanup ====================

    /// Artifacts most similar to `query`; `None` when no vector index is configured.
    pub fn semantic_search(&self, query: &str, limit: usize) -> Option<Vec<SearchHit>> {
        let index = self.index.as_ref()?;
        let scored = index.search(query, limit);
        let inner = self.inner.read();
        Some(
            scored
                .into_iter()
                .filter_map(|hit| {
                    inner
                        .artifacts
                        .iter()
                        .find(|a| a.id.as_str() == hit.id)
                        .map(|a| SearchHit {
                            artifact: a.clone(),
                            score: hit.score,
                        })
                })
                .collect(),
        )
    }

    /// Drop everything held in memory for the task: the task record, its
    /// plans, actions, results, reflections, artifacts and research, plus
    /// its entries in the codebase view and the vector index.
    ///
    /// Persisted copies are kept.
    pub fn purge_task(&self, task_id: &TaskId) {
        let dropped_artifacts: Vec<ArtifactId> = {
            let mut inner = self.inner.write();
            inner.tasks.remove(task_id);
            if let Some(order) = inner.plan_order.remove(task_id) {
                for id in order {
                    inner.plans.remove(&id);
                }
            }

            inner.actions.retain(|a| &a.task_id != task_id);
            inner.results.retain(|r| &r.task_id != task_id);
            inner.reflections.retain(|r| &r.task_id != task_id);
            inner.research.retain(|r| &r.task_id != task_id);
            let dropped = inner
                .artifacts
                .iter()
                .filter(|a| &a.task_id == task_id)
                .map(|a| a.id.clone())
                .collect();
            inner.artifacts.retain(|a| &a.task_id != task_id);
            inner.reindex();
            dropped
        };

        if let Some(index) = &self.index {
            for id in &dropped_artifacts {
                index.remove(id.as_str());
            }
        }
        debug!(task_id = %task_id, artifacts = dropped_artifacts.len(), "Task purged from memory");
    }
}

impl Inner {
    /// Rebuild the position indexes after the logs were compacted.
    fn reindex(&mut self) {
        self.action_index = self
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.clone(), i))
            .collect();
        self.result_index = self
            .results
            .iter()
            .enumerate()
            .map(|(i, r)| (r.action_id.clone(), i))
            .collect();
        // later artifacts win, as in `store_artifact`
        self.codebase = self
            .artifacts
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_code())
            .filter_map(|(i, a)| a.path.clone().map(|path| (path, i)))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::memory_persistence::PersistenceError;
    use crate::ports::vector_index::ScoredId;
    use serde_json::json;
    use std::sync::Mutex;
    use taskpilot_domain::{ActionError, ResearchRequest, Step, StepType};

    fn plan_for(task: &Task) -> Plan {
        Plan::new(
            task.id.clone(),
            "p",
            "",
            vec![Step::new("s1", "S1", StepType::Implementation)],
        )
    }

    fn action_for(task: &Task) -> Action {
        Action::research(task.id.clone(), "r", ResearchRequest::default())
    }

    #[test]
    fn test_task_roundtrip() {
        let memory = MemoryStore::new();
        let mut task = Task::new("Build");
        memory.add_task(task.clone());
        task.activate().unwrap();
        memory.update_task(&task).unwrap();
        assert_eq!(memory.get_task(&task.id).unwrap().status, taskpilot_domain::TaskStatus::Active);

        let stranger = Task::new("unknown");
        assert_eq!(
            memory.update_task(&stranger),
            Err(MemoryError::TaskNotFound(stranger.id.clone()))
        );
    }

    #[test]
    fn test_single_active_plan_and_history_chain() {
        let memory = MemoryStore::new();
        let task = Task::new("t");
        let first = plan_for(&task);
        memory.store_plan(first.clone());

        let second = first.revise(first.steps.clone(), "insight");
        memory.store_plan(second.clone());

        let stored_first = memory.get_plan(&first.id).unwrap();
        assert_eq!(stored_first.status, PlanStatus::Superseded);
        assert_eq!(memory.get_active_plan(&task.id).unwrap().id, second.id);
        assert_eq!(memory.get_latest_plan_for_task(&task.id).unwrap().id, second.id);

        let history: Vec<_> = memory
            .get_plan_history(&task.id)
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(history, vec![second.id, first.id]);
    }

    #[test]
    fn test_recent_history_pairs_results_most_recent_first() {
        let memory = MemoryStore::new();
        let task = Task::new("t");
        let first = action_for(&task);
        let second = action_for(&task);

        memory.record_action(&first);
        memory
            .store_result(&first, &ActionResult::success(&first, json!({"ok": true})))
            .unwrap();
        memory.record_action(&second);

        let history = memory.get_recent_history(10);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action.id, second.id);
        assert!(history[0].result.is_none());
        assert!(history[1].result.as_ref().unwrap().is_success());

        assert_eq!(memory.get_recent_history(1).len(), 1);
    }

    #[test]
    fn test_results_are_immutable() {
        let memory = MemoryStore::new();
        let task = Task::new("t");
        let action = action_for(&task);
        let failed = ActionResult::failure(&action, ActionError::new("x", "boom"));
        memory.store_result(&action, &failed).unwrap();
        assert_eq!(
            memory.store_result(&action, &ActionResult::success(&action, json!({}))),
            Err(MemoryError::DuplicateResult(action.id.clone()))
        );
        assert_eq!(memory.get_results_for_task(&task.id).len(), 1);
    }

    #[test]
    fn test_codebase_keeps_latest_artifact_per_path() {
        let memory = MemoryStore::new();
        let task_id = TaskId::new("t");
        memory.store_artifact(&Artifact::code(task_id.clone(), "src/a.rs", "v1"));
        memory.store_artifact(&Artifact::code(task_id.clone(), "src/b.rs", "b"));
        memory.store_artifact(&Artifact::code(task_id.clone(), "src/a.rs", "v2"));
        memory.store_artifact(&Artifact::document(task_id.clone(), "notes"));

        let codebase = memory.get_codebase();
        assert_eq!(codebase.len(), 2);
        assert_eq!(codebase[0].content.as_deref(), Some("v2"));
        assert_eq!(memory.get_codebase_paths(), vec!["src/a.rs", "src/b.rs"]);
        assert_eq!(memory.get_artifacts_for_task(&task_id).len(), 4);
    }

    #[test]
    fn test_research_results_are_stored_as_artifacts() {
        let memory = MemoryStore::new();
        let task_id = TaskId::new("t");
        let artifact = memory.store_research_results(
            &task_id,
            Some(&StepId::new("s1")),
            &["tokio timeouts".to_string()],
            &json!({"summary": "use tokio::time::timeout"}),
        );
        let records = memory.get_research_for_task(&task_id);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, artifact.id);
        assert_eq!(memory.get_artifacts_for_step(&task_id, &StepId::new("s1")).len(), 1);
        let artifacts = memory.get_artifacts_for_task(&task_id);
        assert_eq!(artifacts[0].kind, ArtifactKind::Research);
        assert_eq!(artifacts[0].content.as_deref(), Some("use tokio::time::timeout"));
    }

    #[test]
    fn test_final_reflection_is_flagged() {
        let memory = MemoryStore::new();
        let task_id = TaskId::new("t");
        memory.store_final_reflection(&Reflection::heuristic(task_id.clone(), None, true));
        assert!(memory.get_reflections(&task_id)[0].is_final);
    }

    struct FailingPersistence {
        attempts: Mutex<usize>,
    }

    impl MemoryPersistence for FailingPersistence {
        fn persist(&self, _c: &str, _id: &str, _v: &Value) -> Result<(), PersistenceError> {
            *self.attempts.lock().unwrap() += 1;
            Err(PersistenceError("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn test_persistence_failures_are_not_fatal() {
        let persistence = Arc::new(FailingPersistence {
            attempts: Mutex::new(0),
        });
        let memory = MemoryStore::new().with_persistence(persistence.clone());
        let task = Task::new("t");
        memory.add_task(task.clone());
        memory.store_plan(plan_for(&task));
        assert!(memory.get_task(&task.id).is_some());
        memory.flush().await;
        assert_eq!(*persistence.attempts.lock().unwrap(), 2);
    }

    /// Records which thread each write ran on, holding every write for a while
    struct SlowPersistence {
        writes: Mutex<Vec<(String, std::thread::ThreadId)>>,
    }

    impl MemoryPersistence for SlowPersistence {
        fn persist(&self, _c: &str, id: &str, _v: &Value) -> Result<(), PersistenceError> {
            std::thread::sleep(std::time::Duration::from_millis(20));
            self.writes
                .lock()
                .unwrap()
                .push((id.to_string(), std::thread::current().id()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_mirror_writes_leave_the_caller_thread_in_order() {
        let persistence = Arc::new(SlowPersistence {
            writes: Mutex::new(Vec::new()),
        });
        let memory = MemoryStore::new().with_persistence(persistence.clone());
        let mut task = Task::new("t");
        memory.add_task(task.clone());
        task.activate().unwrap();
        memory.update_task(&task).unwrap();
        // nothing has been written yet: the store did not wait on the disk
        assert!(persistence.writes.lock().unwrap().len() < 2);

        memory.flush().await;
        let writes = persistence.writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 2);
        assert!(writes.iter().all(|(id, _)| id == task.id.as_str()));
        let caller = std::thread::current().id();
        assert!(writes.iter().all(|(_, thread)| *thread != caller));
    }

    struct KeywordIndex {
        docs: Mutex<Vec<(String, String)>>,
    }

    impl VectorIndex for KeywordIndex {
        fn index(&self, id: &str, text: &str) {
            self.docs.lock().unwrap().push((id.to_string(), text.to_string()));
        }

        fn remove(&self, id: &str) {
            self.docs.lock().unwrap().retain(|(doc, _)| doc != id);
        }

        fn search(&self, query: &str, limit: usize) -> Vec<ScoredId> {
            self.docs
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, text)| text.contains(query))
                .take(limit)
                .map(|(id, _)| ScoredId {
                    id: id.clone(),
                    score: 1.0,
                })
                .collect()
        }
    }

    #[test]
    fn test_semantic_search_requires_index() {
        let memory = MemoryStore::new();
        assert!(memory.semantic_search("x", 3).is_none());

        let memory = MemoryStore::new().with_vector_index(Arc::new(KeywordIndex {
            docs: Mutex::new(Vec::new()),
        }));
        memory.store_artifact(&Artifact::code(TaskId::new("t"), "src/router.rs", "fn route()"));
        let hits = memory.semantic_search("router", 3).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].artifact.path.as_deref(), Some("src/router.rs"));
    }

    #[test]
    fn test_purge_task() {
        let memory = MemoryStore::new();
        let task = Task::new("t");
        memory.add_task(task.clone());
        memory.store_plan(plan_for(&task));
        memory.purge_task(&task.id);
        assert!(memory.get_task(&task.id).is_none());
        assert!(memory.get_active_plan(&task.id).is_none());
    }

    #[test]
    fn test_purge_task_drops_its_logs_and_keeps_other_tasks() {
        let memory = MemoryStore::new().with_vector_index(Arc::new(KeywordIndex {
            docs: Mutex::new(Vec::new()),
        }));
        let gone = Task::new("gone");
        let kept = Task::new("kept");
        for task in [&gone, &kept] {
            memory.add_task(task.clone());
            let action = action_for(task);
            memory
                .store_result(&action, &ActionResult::success(&action, json!({})))
                .unwrap();
            memory.store_reflection(&Reflection::heuristic(task.id.clone(), None, true));
            memory.store_research_results(&task.id, None, &["q".to_string()], &json!({"summary": "s"}));
        }
        memory.store_artifact(&Artifact::code(kept.id.clone(), "src/shared.rs", "kept"));
        memory.store_artifact(&Artifact::code(gone.id.clone(), "src/shared.rs", "gone"));
        memory.store_artifact(&Artifact::code(gone.id.clone(), "src/only_gone.rs", "gone"));
        let kept_action = memory.get_task_history(&kept.id, 1)[0].action.clone();

        memory.purge_task(&gone.id);

        assert!(memory.get_task_history(&gone.id, usize::MAX).is_empty());
        assert!(memory.get_results_for_task(&gone.id).is_empty());
        assert!(memory.get_reflections(&gone.id).is_empty());
        assert!(memory.get_research_for_task(&gone.id).is_empty());
        assert!(memory.get_artifacts_for_task(&gone.id).is_empty());
        assert!(memory.semantic_search("only_gone", 5).unwrap().is_empty());

        let codebase = memory.get_codebase();
        assert_eq!(codebase.len(), 1);
        assert_eq!(codebase[0].content.as_deref(), Some("kept"));

        let history = memory.get_task_history(&kept.id, usize::MAX);
        assert_eq!(history.len(), 1);
        assert!(history[0].result.is_some());
        assert_eq!(memory.get_reflections(&kept.id).len(), 1);
        assert_eq!(memory.get_research_for_task(&kept.id).len(), 1);
        // indexes still line up after compaction
        assert_eq!(
            memory.store_result(&kept_action, &ActionResult::success(&kept_action, json!({}))),
            Err(MemoryError::DuplicateResult(kept_action.id.clone()))
        );
    }
}
