//! File-system port
//!
//! Used by file-producing handlers to persist artifacts and by perception to
//! enumerate the project. Paths are relative to the adapter's project root.

use super::collaborator_error::CollaboratorError;
use async_trait::async_trait;
use taskpilot_domain::FileEntry;

#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Display form of the project root
    fn root(&self) -> String;

    async fn read_file(&self, path: &str) -> Result<String, CollaboratorError>;

    /// Create or overwrite; parent directories are created as needed.
    async fn write_file(&self, path: &str, content: &str) -> Result<(), CollaboratorError>;

    async fn delete_file(&self, path: &str) -> Result<(), CollaboratorError>;

    async fn list_files(
        &self,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<FileEntry>, CollaboratorError>;

    async fn create_directory(&self, path: &str) -> Result<(), CollaboratorError>;
}
