//! Agent loop parameters.
//!
//! [`AgentConfig`] groups the static parameters that bound one task's run in
//! [`RunTaskUseCase`](crate::use_cases::run_task::RunTaskUseCase).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do once consecutive unblock attempts reach the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForcedProgressPolicy {
    /// Execute the blocked step with the fewest dependencies anyway
    #[default]
    Bypass,
    /// Stop and mark the task failed
    Fail,
}

impl std::fmt::Display for ForcedProgressPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForcedProgressPolicy::Bypass => write!(f, "bypass"),
            ForcedProgressPolicy::Fail => write!(f, "fail"),
        }
    }
}

/// Agent loop control parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard cap on perceive→plan→execute→reflect cycles per task.
    pub max_iterations: usize,
    /// Consecutive failed actions before the task is marked failed.
    pub max_consecutive_failures: usize,
    /// Consecutive unblock attempts before the escape valve fires.
    pub unblock_threshold: u32,
    pub forced_progress: ForcedProgressPolicy,
    /// Actions per task below which successful results get a heuristic reflection.
    pub reflection_threshold: usize,
    /// Rolling window of recent actions shown to the reflector.
    pub history_window: usize,
    /// Wall-clock budget for one research session.
    pub research_timeout: Duration,
    pub max_research_queries: usize,
    /// Search results visited per research query when a browser is available.
    pub visit_top_results: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            max_consecutive_failures: 3,
            unblock_threshold: 5,
            forced_progress: ForcedProgressPolicy::Bypass,
            reflection_threshold: 3,
            history_window: 5,
            research_timeout: Duration::from_secs(120),
            max_research_queries: 3,
            visit_top_results: 2,
        }
    }
}

impl AgentConfig {
    // ==================== Builder Methods ====================

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_max_consecutive_failures(mut self, max: usize) -> Self {
        self.max_consecutive_failures = max;
        self
    }

    pub fn with_unblock_threshold(mut self, threshold: u32) -> Self {
        self.unblock_threshold = threshold;
        self
    }

    pub fn with_forced_progress(mut self, policy: ForcedProgressPolicy) -> Self {
        self.forced_progress = policy;
        self
    }

    pub fn with_reflection_threshold(mut self, threshold: usize) -> Self {
        self.reflection_threshold = threshold;
        self
    }

    pub fn with_research_timeout(mut self, timeout: Duration) -> Self {
        self.research_timeout = timeout;
        self
    }
}

/// Limits for perception's relevant-code selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptionConfig {
    pub max_relevant_files: usize,
    /// Files larger than this are never read.
    pub max_file_bytes: u64,
    pub capture_screenshot: bool,
    /// Extensions (without dot) that earn a relevance bonus.
    pub relevant_extensions: Vec<String>,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            max_relevant_files: 10,
            max_file_bytes: 100_000,
            capture_screenshot: false,
            relevant_extensions: [
                "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "rb", "html", "css", "json",
                "toml", "yaml", "yml", "sql", "sh", "md",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Background sweep of idle runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Runs with no lifecycle activity for this long are purged.
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}
