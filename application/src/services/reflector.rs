//! Reflector
//!
//! Decides after each action whether the plan is still viable. Early
//! successful actions get a heuristic reflection without a completion call;
//! failures and later actions ask the model, degrading to the heuristic when
//! that does not work out.

use crate::config::AgentConfig;
use crate::services::completion::CompletionService;
use crate::services::memory::MemoryStore;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use taskpilot_domain::structured::extract_from_response;
use taskpilot_domain::{
    CompletionOptions, FinalReport, HistoryEntry, Plan, PromptTemplate, Reflection, Task, TaskId,
};
use tracing::{debug, info, warn};

/// Per-task rolling state
#[derive(Default)]
struct Window {
    actions_seen: usize,
    recent: VecDeque<HistoryEntry>,
}

pub struct Reflector {
    completion: Arc<CompletionService>,
    config: AgentConfig,
    windows: Mutex<HashMap<TaskId, Window>>,
}

impl Reflector {
    pub fn new(completion: Arc<CompletionService>, config: AgentConfig) -> Self {
        Self {
            completion,
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn options() -> CompletionOptions {
        CompletionOptions::default().with_system(PromptTemplate::reflector_system())
    }

    /// Assess `plan` after `latest` was executed.
    pub async fn reflect(&self, task: &Task, plan: &Plan, latest: &HistoryEntry) -> Reflection {
        let succeeded = latest.result.as_ref().is_some_and(|r| r.is_success());
        let action_id = Some(latest.action.id.clone());

        // history excludes the latest entry, newest first
        let (seen, history) = {
            let mut windows = self.windows.lock();
            let window = windows.entry(task.id.clone()).or_default();
            window.actions_seen += 1;
            let history: Vec<HistoryEntry> = window.recent.iter().rev().cloned().collect();
            window.recent.push_back(latest.clone());
            while window.recent.len() > self.config.history_window.max(1) {
                window.recent.pop_front();
            }
            (window.actions_seen, history)
        };

        if succeeded && seen < self.config.reflection_threshold {
            debug!(task_id = %task.id, seen, "Heuristic reflection");
            return Reflection::heuristic(task.id.clone(), action_id, true);
        }
        if !self.completion.is_available() {
            debug!(task_id = %task.id, "Completion unavailable, heuristic reflection");
            return Reflection::heuristic(task.id.clone(), action_id, succeeded);
        }

        let prompt = PromptTemplate::reflection(plan, latest, &history);
        let response = match self.completion.complete_structured(&prompt, &Self::options()).await {
            Ok(response) => response,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Reflection request failed");
                return Reflection::heuristic(task.id.clone(), action_id, succeeded);
            }
        };

        let parsed = extract_from_response(&response)
            .ok()
            .and_then(|json| Reflection::from_json(task.id.clone(), action_id.clone(), &json));
        match parsed {
            Some(reflection) => {
                info!(
                    task_id = %task.id,
                    needs_plan_revision = reflection.needs_plan_revision,
                    needs_research = reflection.needs_research,
                    confidence = reflection.confidence,
                    "Reflection complete"
                );
                reflection
            }
            None => {
                warn!(task_id = %task.id, "Reflection response unusable, using heuristic");
                Reflection::heuristic(task.id.clone(), action_id, succeeded)
            }
        }
    }

    /// Summarize a finished task; a minimal acknowledgment when the model
    /// cannot produce a report.
    pub async fn generate_final_report(
        &self,
        task: &Task,
        plan: &Plan,
        memory: &MemoryStore,
    ) -> FinalReport {
        let progress = plan.progress();
        let fallback = || {
            FinalReport::acknowledgment(task.description(), progress.completed, progress.total)
        };
        if !self.completion.is_available() {
            return fallback();
        }

        let artifacts = memory.get_artifacts_for_task(&task.id);
        let prompt = PromptTemplate::final_report(task, plan, &artifacts);
        match self.completion.complete_structured(&prompt, &Self::options()).await {
            Ok(response) => extract_from_response(&response)
                .ok()
                .and_then(|json| FinalReport::from_json(&json))
                .unwrap_or_else(|| {
                    warn!(task_id = %task.id, "Final report unusable, acknowledging");
                    fallback()
                }),
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Final report request failed");
                fallback()
            }
        }
    }

    /// Drop the rolling window of a finished task.
    pub fn forget(&self, task_id: &TaskId) {
        self.windows.lock().remove(task_id);
    }
}
