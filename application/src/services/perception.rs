//! Perception
//!
//! Rebuilds the [`WorldState`] at the top of every cycle. Each source
//! (project listing, relevant code, environment, screenshot) runs on its
//! own; a failing source is logged and its field left empty, so perception
//! itself never fails.

use crate::config::PerceptionConfig;
use crate::ports::computer::ComputerControl;
use crate::ports::file_system::FileSystem;
use crate::services::memory::MemoryStore;
use chrono::Utc;
use std::sync::Arc;
use taskpilot_domain::core::string::keywords;
use taskpilot_domain::{
    EnvironmentInfo, FileEntry, Plan, PlanSnapshot, RelevantFile, Screenshot, Step, WorldState,
};
use tracing::{debug, warn};

/// Marker file → project type, checked in order
const PROJECT_MARKERS: &[(&str, &str)] = &[
    ("Cargo.toml", "rust"),
    ("package.json", "node"),
    ("pyproject.toml", "python"),
    ("requirements.txt", "python"),
    ("go.mod", "go"),
    ("pom.xml", "java"),
    ("build.gradle", "java"),
    ("Gemfile", "ruby"),
    ("index.html", "static-web"),
];

/// Hard cap on listed paths kept in the snapshot
const MAX_STRUCTURE_ENTRIES: usize = 500;

pub struct Perceiver {
    file_system: Option<Arc<dyn FileSystem>>,
    computer: Option<Arc<dyn ComputerControl>>,
    config: PerceptionConfig,
}

impl Perceiver {
    pub fn new(config: PerceptionConfig) -> Self {
        Self {
            file_system: None,
            computer: None,
            config,
        }
    }

    pub fn with_file_system(mut self, file_system: Arc<dyn FileSystem>) -> Self {
        self.file_system = Some(file_system);
        self
    }

    pub fn with_computer(mut self, computer: Arc<dyn ComputerControl>) -> Self {
        self.computer = Some(computer);
        self
    }

    /// Snapshot the world for one cycle.
    pub async fn perceive(&self, memory: &MemoryStore, plan: Option<&Plan>) -> WorldState {
        let files = self.list_project(memory).await;
        let project_structure = files.as_ref().map(|entries| {
            entries
                .iter()
                .take(MAX_STRUCTURE_ENTRIES)
                .map(|e| e.path.clone())
                .collect::<Vec<_>>()
        });

        let current_plan = plan.map(PlanSnapshot::of);
        let relevant_code = match (plan.and_then(Plan::current_step), &files) {
            (Some(step), Some(files)) => self.relevant_code(step, files, memory).await,
            _ => Vec::new(),
        };

        let environment = Some(self.environment(files.as_deref()));
        let visual_snapshot = self.screenshot().await;

        WorldState {
            timestamp: Utc::now(),
            project_structure,
            relevant_code,
            current_plan,
            environment,
            visual_snapshot,
        }
    }

    /// Project files from the file system, else the memory codebase view.
    async fn list_project(&self, memory: &MemoryStore) -> Option<Vec<FileEntry>> {
        match &self.file_system {
            Some(fs) => match fs.list_files(".", true).await {
                Ok(entries) => Some(entries.into_iter().filter(|e| !e.is_dir).collect()),
                Err(e) => {
                    warn!(error = %e, "Project listing failed; omitting structure");
                    None
                }
            },
            None => {
                let codebase = memory.get_codebase();
                if codebase.is_empty() {
                    return None;
                }
                Some(
                    codebase
                        .iter()
                        .filter_map(|a| {
                            a.path.as_ref().map(|p| {
                                FileEntry::file(
                                    p.clone(),
                                    a.content.as_ref().map_or(0, |c| c.len() as u64),
                                )
                            })
                        })
                        .collect(),
                )
            }
        }
    }

    /// Rank a file against step keywords: 2 per keyword found in the path,
    /// plus 1 for a relevant extension. Files without any keyword hit score 0.
    fn score(&self, entry: &FileEntry, keywords: &[String]) -> usize {
        let path = entry.path.to_lowercase();
        let hits = keywords.iter().filter(|k| path.contains(k.as_str())).count();
        if hits == 0 {
            return 0;
        }
        let ext_bonus = entry
            .extension()
            .is_some_and(|ext| self.config.relevant_extensions.contains(&ext));
        hits * 2 + usize::from(ext_bonus)
    }

    async fn relevant_code(
        &self,
        step: &Step,
        files: &[FileEntry],
        memory: &MemoryStore,
    ) -> Vec<RelevantFile> {
        let keywords = keywords(&format!("{} {}", step.title, step.description));
        if keywords.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<(usize, &FileEntry)> = files
            .iter()
            .filter(|e| e.size <= self.config.max_file_bytes)
            .map(|e| (self.score(e, &keywords), e))
            .filter(|(score, _)| *score > 0)
            .collect();
        // stable: ties keep listing order
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        ranked.truncate(self.config.max_relevant_files);

        let mut relevant = Vec::with_capacity(ranked.len());
        for (score, entry) in ranked {
            let content = match &self.file_system {
                Some(fs) => match fs.read_file(&entry.path).await {
                    Ok(content) => content,
                    Err(e) => {
                        debug!(path = %entry.path, error = %e, "Skipping unreadable file");
                        continue;
                    }
                },
                None => match memory
                    .get_codebase()
                    .into_iter()
                    .find(|a| a.path.as_deref() == Some(entry.path.as_str()))
                    .and_then(|a| a.content)
                {
                    Some(content) => content,
                    None => continue,
                },
            };
            relevant.push(RelevantFile {
                path: entry.path.clone(),
                score,
                content,
            });
        }
        relevant
    }

    fn environment(&self, files: Option<&[FileEntry]>) -> EnvironmentInfo {
        let working_directory = match &self.file_system {
            Some(fs) => fs.root(),
            None => std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        };
        let project_type = files.and_then(|files| {
            PROJECT_MARKERS
                .iter()
                .find(|(marker, _)| files.iter().any(|f| f.path == *marker))
                .map(|(_, kind)| kind.to_string())
        });
        EnvironmentInfo {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            working_directory,
            project_type,
        }
    }

    async fn screenshot(&self) -> Option<Screenshot> {
        if !self.config.capture_screenshot {
            return None;
        }
        let computer = self.computer.as_ref()?;
        match computer.take_screenshot().await {
            Ok(shot) => Some(shot),
            Err(e) => {
                warn!(error = %e, "Screenshot failed; omitting visual snapshot");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::collaborator_error::CollaboratorError;
    use crate::testing::InMemoryFileSystem;
    use async_trait::async_trait;
    use taskpilot_domain::{Artifact, StepType, TaskId};

    fn plan_with_step(title: &str) -> Plan {
        Plan::new(
            TaskId::new("t"),
            "p",
            "",
            vec![Step::new("s1", title, StepType::Implementation)],
        )
    }

    #[tokio::test]
    async fn test_relevant_code_ranks_keyword_matches() {
        let fs = InMemoryFileSystem::with_files(&[
            ("Cargo.toml", "[package]"),
            ("src/router.rs", "fn route() {}"),
            ("src/login/router.rs", "fn login() {}"),
            ("docs/unrelated.txt", "nothing"),
        ]);
        let perceiver = Perceiver::new(PerceptionConfig::default()).with_file_system(Arc::new(fs));
        let plan = plan_with_step("Add login router");

        let state = perceiver.perceive(&MemoryStore::new(), Some(&plan)).await;

        let paths: Vec<_> = state.relevant_code.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/login/router.rs", "src/router.rs"]);
        assert_eq!(state.relevant_code[0].score, 5);
        assert_eq!(state.project_structure.as_ref().unwrap().len(), 4);
        assert_eq!(
            state.environment.unwrap().project_type.as_deref(),
            Some("rust")
        );
        let snapshot = state.current_plan.unwrap();
        assert_eq!(snapshot.current_step.unwrap().id.as_str(), "s1");
    }

    #[tokio::test]
    async fn test_relevant_code_skips_oversize_and_caps_count() {
        let big = "x".repeat(64);
        let fs = InMemoryFileSystem::with_files(&[
            ("a/parser.rs", "small"),
            ("b/parser.rs", &big),
            ("c/parser.rs", "small"),
        ]);
        let config = PerceptionConfig {
            max_relevant_files: 1,
            max_file_bytes: 10,
            ..PerceptionConfig::default()
        };
        let perceiver = Perceiver::new(config).with_file_system(Arc::new(fs));

        let state = perceiver
            .perceive(&MemoryStore::new(), Some(&plan_with_step("Write parser")))
            .await;
        assert_eq!(state.relevant_code.len(), 1);
        assert_eq!(state.relevant_code[0].path, "a/parser.rs");
    }

    struct BrokenFileSystem;

    #[async_trait]
    impl FileSystem for BrokenFileSystem {
        fn root(&self) -> String {
            "/broken".to_string()
        }
        async fn read_file(&self, path: &str) -> Result<String, CollaboratorError> {
            Err(CollaboratorError::NotFound(path.to_string()))
        }
        async fn write_file(&self, _: &str, _: &str) -> Result<(), CollaboratorError> {
            Err(CollaboratorError::Io("broken".into()))
        }
        async fn delete_file(&self, _: &str) -> Result<(), CollaboratorError> {
            Err(CollaboratorError::Io("broken".into()))
        }
        async fn list_files(&self, _: &str, _: bool) -> Result<Vec<FileEntry>, CollaboratorError> {
            Err(CollaboratorError::Io("disk gone".into()))
        }
        async fn create_directory(&self, _: &str) -> Result<(), CollaboratorError> {
            Err(CollaboratorError::Io("broken".into()))
        }
    }

    #[tokio::test]
    async fn test_failed_source_is_omitted_not_fatal() {
        let perceiver = Perceiver::new(PerceptionConfig::default())
            .with_file_system(Arc::new(BrokenFileSystem));
        let plan = plan_with_step("Anything");

        let state = perceiver.perceive(&MemoryStore::new(), Some(&plan)).await;
        assert!(state.project_structure.is_none());
        assert!(state.relevant_code.is_empty());
        assert!(state.current_plan.is_some());
        assert_eq!(state.environment.unwrap().working_directory, "/broken");
    }

    #[tokio::test]
    async fn test_codebase_view_without_file_system() {
        let memory = MemoryStore::new();
        memory.store_artifact(&Artifact::code(
            TaskId::new("t"),
            "src/cache.rs",
            "struct Cache;",
        ));
        let perceiver = Perceiver::new(PerceptionConfig::default());

        let state = perceiver
            .perceive(&memory, Some(&plan_with_step("Extend cache eviction")))
            .await;
        assert_eq!(state.project_structure, Some(vec!["src/cache.rs".to_string()]));
        assert_eq!(state.relevant_code[0].content, "struct Cache;");
        assert!(state.visual_snapshot.is_none());
    }
}
