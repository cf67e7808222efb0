//! Local computer control
//!
//! Runs shell commands (`sh -c`, or `cmd /C` on Windows) under a wall-clock
//! timeout. Screenshots, input injection and app control have no portable
//! implementation here and report `Unsupported`. Command screening happens in
//! the application's command guard before anything reaches this adapter.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use taskpilot_application::ports::computer::CommandOutput;
use taskpilot_application::{CollaboratorError, ComputerControl};
use taskpilot_domain::Screenshot;
use tokio::process::Command;
use tracing::{debug, warn};

/// Default timeout for command execution (60 seconds)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum bytes kept per stream (1 MB)
const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

pub struct LocalComputer {
    working_dir: PathBuf,
    timeout: Duration,
}

impl LocalComputer {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn shell(command: &str) -> Command {
        if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        }
    }
}

fn lossy_truncated(bytes: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(bytes).to_string();
    if text.len() > MAX_OUTPUT_SIZE {
        let end = text.floor_char_boundary(MAX_OUTPUT_SIZE);
        text.truncate(end);
        text.push_str("\n... (output truncated)");
    }
    text
}

#[async_trait]
impl ComputerControl for LocalComputer {
    async fn execute_command(
        &self,
        command: &str,
        working_dir: Option<&str>,
    ) -> Result<CommandOutput, CollaboratorError> {
        if command.trim().is_empty() {
            return Err(CollaboratorError::InvalidInput("empty command".into()));
        }

        let dir = match working_dir {
            Some(dir) => self.working_dir.join(dir),
            None => self.working_dir.clone(),
        };
        if !dir.is_dir() {
            return Err(CollaboratorError::NotFound(format!(
                "Working directory does not exist: {}",
                dir.display()
            )));
        }

        let mut cmd = Self::shell(command);
        cmd.current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command, dir = %dir.display(), "Executing command");
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(command, timeout_secs = self.timeout.as_secs(), "Command timed out");
                return Err(CollaboratorError::Timeout(self.timeout.as_secs()));
            }
        };

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: lossy_truncated(&output.stdout),
            stderr: lossy_truncated(&output.stderr),
        })
    }

    async fn take_screenshot(&self) -> Result<Screenshot, CollaboratorError> {
        Err(CollaboratorError::Unsupported("screenshot capture".into()))
    }

    async fn send_input(&self, _input: &str) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::Unsupported("input injection".into()))
    }

    async fn control_app(&self, app: &str, _operation: &str) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::Unsupported(format!("controlling '{}'", app)))
    }
}
