//! Generated outputs (code, documents, research reports).

use crate::core::ids::{ArtifactId, StepId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A source file; indexed by path in the codebase view
    Code,
    /// Free-form text (architecture notes, deployment instructions)
    Document,
    /// A synthesized research report
    Research,
    /// The final task report
    Report,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &str {
        match self {
            ArtifactKind::Code => "code",
            ArtifactKind::Document => "document",
            ArtifactKind::Research => "research",
            ArtifactKind::Report => "report",
        }
    }
}

/// A durable output produced while executing a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub kind: ArtifactKind,
    pub task_id: TaskId,
    pub step_id: Option<StepId>,
    pub path: Option<String>,
    pub content: Option<String>,
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, task_id: TaskId) -> Self {
        Self {
            id: ArtifactId::generate(),
            kind,
            task_id,
            step_id: None,
            path: None,
            content: None,
            description: None,
            timestamp: Utc::now(),
        }
    }

    /// A code file at `path`
    pub fn code(task_id: TaskId, path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(ArtifactKind::Code, task_id)
            .with_path(path)
            .with_content(content)
    }

    pub fn document(task_id: TaskId, content: impl Into<String>) -> Self {
        Self::new(ArtifactKind::Document, task_id).with_content(content)
    }

    pub fn with_step(mut self, step_id: StepId) -> Self {
        self.step_id = Some(step_id);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_code(&self) -> bool {
        self.kind == ArtifactKind::Code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_artifact() {
        let artifact = Artifact::code(TaskId::new("t1"), "src/main.rs", "fn main() {}")
            .with_step(StepId::new("step-1"));
        assert!(artifact.is_code());
        assert_eq!(artifact.path.as_deref(), Some("src/main.rs"));
        assert_eq!(artifact.step_id, Some(StepId::new("step-1")));
        assert!(artifact.id.as_str().starts_with("artifact-"));
    }
}
