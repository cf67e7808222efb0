//! In-crate test doubles shared by service and use-case tests.

use crate::ports::collaborator_error::CollaboratorError;
use crate::ports::file_system::FileSystem;
use crate::ports::lifecycle::LifecycleNotifier;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use taskpilot_domain::{FileEntry, LifecycleEvent};

/// File system backed by a map; paths are stored relative, without `./`.
#[derive(Default)]
pub(crate) struct InMemoryFileSystem {
    pub(crate) files: Mutex<BTreeMap<String, String>>,
    /// Writes to these paths fail with `PermissionDenied`
    pub(crate) read_only: HashSet<String>,
}

impl InMemoryFileSystem {
    pub(crate) fn with_files(files: &[(&str, &str)]) -> Self {
        Self {
            files: Mutex::new(
                files
                    .iter()
                    .map(|(p, c)| (p.to_string(), c.to_string()))
                    .collect(),
            ),
            read_only: HashSet::new(),
        }
    }

    pub(crate) fn read_only(mut self, path: &str) -> Self {
        self.read_only.insert(path.to_string());
        self
    }

    pub(crate) fn get(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }
}

fn clean(path: &str) -> String {
    path.trim_start_matches("./").trim_matches('/').to_string()
}

#[async_trait]
impl FileSystem for InMemoryFileSystem {
    fn root(&self) -> String {
        "/workspace".to_string()
    }

    async fn read_file(&self, path: &str) -> Result<String, CollaboratorError> {
        self.get(&clean(path))
            .ok_or_else(|| CollaboratorError::NotFound(path.to_string()))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), CollaboratorError> {
        let path = clean(path);
        if self.read_only.contains(&path) {
            return Err(CollaboratorError::PermissionDenied(path));
        }
        self.files.lock().unwrap().insert(path, content.to_string());
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<(), CollaboratorError> {
        self.files
            .lock()
            .unwrap()
            .remove(&clean(path))
            .map(|_| ())
            .ok_or_else(|| CollaboratorError::NotFound(path.to_string()))
    }

    async fn list_files(
        &self,
        path: &str,
        _recursive: bool,
    ) -> Result<Vec<FileEntry>, CollaboratorError> {
        let prefix = clean(path);
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| prefix.is_empty() || prefix == "." || p.starts_with(&prefix))
            .map(|(p, c)| FileEntry::file(p.clone(), c.len() as u64))
            .collect())
    }

    async fn create_directory(&self, _path: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// Records every event it is notified of
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub(crate) events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingNotifier {
    pub(crate) fn types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(LifecycleEvent::event_type)
            .collect()
    }
}

impl LifecycleNotifier for RecordingNotifier {
    fn notify(&self, event: &LifecycleEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
