//! World-state snapshot built once per cycle.
//!
//! Every field that comes from an external source is optional: a source that
//! fails leaves its field empty instead of failing the cycle.

use crate::core::ids::{PlanId, StepId};
use crate::plan::{Plan, StepType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry returned by a file-system listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the project root, `/`-separated
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
}

impl FileEntry {
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            size,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            size: 0,
        }
    }

    /// Lowercased extension without the dot
    pub fn extension(&self) -> Option<String> {
        let name = self.path.rsplit('/').next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }
}

/// A source file selected as relevant to the current step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevantFile {
    pub path: String,
    pub score: usize,
    pub content: String,
}

/// Facts about the machine the agent runs on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub os: String,
    pub arch: String,
    pub working_directory: String,
    /// Detected from marker files (`Cargo.toml` → `rust`, ...)
    pub project_type: Option<String>,
}

/// Captured screen image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screenshot {
    pub mime_type: String,
    /// Base64-encoded image bytes
    pub data: String,
}

/// The step perception considers current
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    pub id: StepId,
    pub title: String,
    pub step_type: StepType,
}

/// Progress view over the active plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub plan_id: PlanId,
    pub progress_percent: f64,
    pub completed_count: usize,
    pub pending_count: usize,
    pub blocked_count: usize,
    pub current_step: Option<StepSummary>,
}

impl PlanSnapshot {
    pub fn of(plan: &Plan) -> Self {
        let progress = plan.progress();
        Self {
            plan_id: plan.id.clone(),
            progress_percent: progress.percent,
            completed_count: progress.completed,
            pending_count: progress.pending,
            blocked_count: progress.blocked,
            current_step: plan.current_step().map(|s| StepSummary {
                id: s.id.clone(),
                title: s.title.clone(),
                step_type: s.step_type,
            }),
        }
    }
}

/// Snapshot of the world for one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub timestamp: DateTime<Utc>,
    pub project_structure: Option<Vec<String>>,
    pub relevant_code: Vec<RelevantFile>,
    pub current_plan: Option<PlanSnapshot>,
    pub environment: Option<EnvironmentInfo>,
    pub visual_snapshot: Option<Screenshot>,
}

impl WorldState {
    pub fn empty() -> Self {
        Self {
            timestamp: Utc::now(),
            project_structure: None,
            relevant_code: Vec::new(),
            current_plan: None,
            environment: None,
            visual_snapshot: None,
        }
    }
}

impl Default for WorldState {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::TaskId;
    use crate::plan::Step;

    #[test]
    fn test_file_entry_extension() {
        assert_eq!(FileEntry::file("src/lib.RS", 1).extension().as_deref(), Some("rs"));
        assert_eq!(FileEntry::file(".gitignore", 1).extension(), None);
        assert_eq!(FileEntry::file("Makefile", 1).extension(), None);
    }

    #[test]
    fn test_plan_snapshot_current_step() {
        let mut plan = Plan::new(
            TaskId::new("t"),
            "p",
            "",
            vec![
                Step::new("a", "A", StepType::Research),
                Step::new("b", "B", StepType::Implementation).with_dependency("a"),
            ],
        );
        plan.start_step(&"a".into()).unwrap();
        let snapshot = PlanSnapshot::of(&plan);
        assert_eq!(snapshot.pending_count, 1);
        assert_eq!(snapshot.current_step.unwrap().id.as_str(), "a");
    }
}
