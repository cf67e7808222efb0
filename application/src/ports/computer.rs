//! OS/computer-control port
//!
//! Only computer-control actions use this port, and every command passes the
//! executor's deny-list before it gets here.

use super::collaborator_error::CollaboratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskpilot_domain::Screenshot;

/// Result of a shell command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait ComputerControl: Send + Sync {
    async fn execute_command(
        &self,
        command: &str,
        working_dir: Option<&str>,
    ) -> Result<CommandOutput, CollaboratorError>;

    async fn take_screenshot(&self) -> Result<Screenshot, CollaboratorError>;

    async fn send_input(&self, input: &str) -> Result<(), CollaboratorError>;

    async fn control_app(&self, app: &str, operation: &str) -> Result<String, CollaboratorError>;
}
