//! One JSON file per memory record

use serde_json::Value;
use std::path::{Path, PathBuf};
use taskpilot_application::{MemoryPersistence, PersistenceError};
use tracing::debug;

pub struct JsonFilePersistence {
    directory: PathBuf,
}

impl JsonFilePersistence {
    /// Create the directory if needed; failing here aborts startup.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory).map_err(|e| {
            PersistenceError(format!(
                "Could not create memory directory {}: {}",
                directory.display(),
                e
            ))
        })?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn record_path(&self, collection: &str, id: &str) -> PathBuf {
        self.directory
            .join(sanitize(collection))
            .join(format!("{}.json", sanitize(id)))
    }

    /// Read a record back (used by tooling and tests).
    pub fn load(&self, collection: &str, id: &str) -> Result<Option<Value>, PersistenceError> {
        let path = self.record_path(collection, id);
        match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| PersistenceError(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError(format!("{}: {}", path.display(), e))),
        }
    }
}

/// Keep ids usable as file names
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        _ => cleaned,
    }
}

impl MemoryPersistence for JsonFilePersistence {
    fn persist(&self, collection: &str, id: &str, value: &Value) -> Result<(), PersistenceError> {
        let path = self.record_path(collection, id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PersistenceError(format!("{}: {}", parent.display(), e)))?;
        }

        let text = serde_json::to_string_pretty(value)
            .map_err(|e| PersistenceError(e.to_string()))?;

        // write-then-rename so readers never see a half-written record
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, text)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| PersistenceError(format!("{}: {}", path.display(), e)))?;

        debug!(collection, id, "Persisted record");
        Ok(())
    }
}
