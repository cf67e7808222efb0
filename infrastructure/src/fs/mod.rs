//! Local file system confined to a project root
//!
//! Every path is resolved relative to the root; lexical `..` that would leave
//! the root, and absolute paths outside it, are rejected before touching disk.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use taskpilot_application::{CollaboratorError, FileSystem};
use taskpilot_domain::FileEntry;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Maximum file size to read (10 MB)
const MAX_READ_SIZE: u64 = 10 * 1024 * 1024;

/// Directories never descended into when listing
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules", ".venv", "__pycache__"];

pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map `path` onto a location under the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, CollaboratorError> {
        let requested = Path::new(path);
        let relative = if requested.is_absolute() {
            requested.strip_prefix(&self.root).map_err(|_| {
                CollaboratorError::PermissionDenied(format!("'{}' is outside the project root", path))
            })?
        } else {
            requested
        };

        let mut resolved = self.root.clone();
        let mut depth = 0usize;
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::ParentDir => {
                    if depth == 0 {
                        return Err(CollaboratorError::PermissionDenied(format!(
                            "'{}' escapes the project root",
                            path
                        )));
                    }
                    resolved.pop();
                    depth -= 1;
                }
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }
        Ok(resolved)
    }
}

/// `/`-separated path relative to `root`
fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    fn root(&self) -> String {
        self.root.display().to_string()
    }

    async fn read_file(&self, path: &str) -> Result<String, CollaboratorError> {
        let resolved = self.resolve(path)?;
        let metadata = tokio::fs::metadata(&resolved).await?;
        if !metadata.is_file() {
            return Err(CollaboratorError::InvalidInput(format!("'{}' is not a file", path)));
        }
        if metadata.len() > MAX_READ_SIZE {
            return Err(CollaboratorError::InvalidInput(format!(
                "File too large ({} bytes). Maximum size is {} bytes",
                metadata.len(),
                MAX_READ_SIZE
            )));
        }
        Ok(tokio::fs::read_to_string(&resolved).await?)
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), CollaboratorError> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&resolved, content).await?;
        debug!(path, bytes = content.len(), "Wrote file");
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<(), CollaboratorError> {
        let resolved = self.resolve(path)?;
        if resolved == self.root {
            return Err(CollaboratorError::PermissionDenied(
                "refusing to delete the project root".into(),
            ));
        }
        let metadata = tokio::fs::metadata(&resolved).await?;
        if metadata.is_dir() {
            tokio::fs::remove_dir_all(&resolved).await?;
        } else {
            tokio::fs::remove_file(&resolved).await?;
        }
        Ok(())
    }

    async fn list_files(
        &self,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<FileEntry>, CollaboratorError> {
        let resolved = self.resolve(path)?;
        if !tokio::fs::metadata(&resolved).await?.is_dir() {
            return Err(CollaboratorError::InvalidInput(format!(
                "'{}' is not a directory",
                path
            )));
        }

        let walker = WalkDir::new(&resolved)
            .min_depth(1)
            .max_depth(if recursive { usize::MAX } else { 1 })
            .sort_by_file_name();

        let root = self.root.clone();
        let entries = tokio::task::spawn_blocking(move || {
            walker
                .into_iter()
                .filter_entry(|e| !is_skipped(e))
                .filter_map(Result::ok)
                .map(|entry| {
                    let relative = relative_display(&root, entry.path());
                    if entry.file_type().is_dir() {
                        FileEntry::dir(relative)
                    } else {
                        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                        FileEntry::file(relative, size)
                    }
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| CollaboratorError::Io(e.to_string()))?;

        Ok(entries)
    }

    async fn create_directory(&self, path: &str) -> Result<(), CollaboratorError> {
        let resolved = self.resolve(path)?;
        tokio::fs::create_dir_all(&resolved).await?;
        Ok(())
    }
}
