//! Pass-through handlers that forward an action to one collaborator.

use super::{ActionHandler, CommandGuard, ExecutionContext, HandlerError, HandlerOutput};
use crate::ports::browser::{SearchOptions, VisitOptions};
use async_trait::async_trait;
use serde_json::json;
use taskpilot_domain::core::string::truncate;
use taskpilot_domain::{
    Action, ActionPayload, Artifact, BrowseRequest, ComputerCommand, FileOperation,
};
use tracing::warn;

/// Output kept from a command's stdout/stderr
const MAX_OUTPUT_LEN: usize = 20_000;

pub struct BrowseHandler;

#[async_trait]
impl ActionHandler for BrowseHandler {
    async fn handle(
        &self,
        action: &Action,
        context: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let ActionPayload::Browse(request) = &action.payload else {
            return Err(HandlerError::invalid_payload(action, "browse request"));
        };
        let browser = context
            .browser
            .as_ref()
            .ok_or(HandlerError::MissingCollaborator("browser"))?;

        let payload = match request {
            BrowseRequest::Search { query, max_results } => {
                let options = SearchOptions {
                    max_results: *max_results,
                };
                let results = browser
                    .search(query, &options)
                    .await
                    .map_err(HandlerError::collaborator("search"))?;
                json!({"query": query, "results": results})
            }
            BrowseRequest::Visit { url } => {
                let page = browser
                    .visit_url(url, &VisitOptions::default())
                    .await
                    .map_err(HandlerError::collaborator("page visit"))?;
                json!(page)
            }
        };
        Ok(HandlerOutput::new(payload))
    }
}

pub struct FileHandler;

#[async_trait]
impl ActionHandler for FileHandler {
    async fn handle(
        &self,
        action: &Action,
        context: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let ActionPayload::File(operation) = &action.payload else {
            return Err(HandlerError::invalid_payload(action, "file operation"));
        };
        let fs = context
            .file_system
            .as_ref()
            .ok_or(HandlerError::MissingCollaborator("file system"))?;

        let output = match operation {
            FileOperation::Read { path } => {
                let content = fs
                    .read_file(path)
                    .await
                    .map_err(HandlerError::collaborator("file read"))?;
                HandlerOutput::new(json!({"path": path, "content": content}))
            }
            FileOperation::Write { path, content } => {
                fs.write_file(path, content)
                    .await
                    .map_err(HandlerError::collaborator("file write"))?;
                let mut artifact = Artifact::code(action.task_id.clone(), path, content);
                if let Some(step_id) = &action.step_id {
                    artifact = artifact.with_step(step_id.clone());
                }
                context.memory.store_artifact(&artifact);
                HandlerOutput::new(json!({"path": path, "bytes": content.len()}))
                    .with_artifacts(vec![artifact])
            }
            FileOperation::Delete { path } => {
                fs.delete_file(path)
                    .await
                    .map_err(HandlerError::collaborator("file delete"))?;
                HandlerOutput::new(json!({"path": path, "deleted": true}))
            }
            FileOperation::List { path, recursive } => {
                let entries = fs
                    .list_files(path, *recursive)
                    .await
                    .map_err(HandlerError::collaborator("file listing"))?;
                HandlerOutput::new(json!({"path": path, "entries": entries}))
            }
            FileOperation::CreateDirectory { path } => {
                fs.create_directory(path)
                    .await
                    .map_err(HandlerError::collaborator("directory creation"))?;
                HandlerOutput::new(json!({"path": path, "created": true}))
            }
        };
        Ok(output)
    }
}

pub struct ComputerHandler {
    guard: CommandGuard,
}

impl ComputerHandler {
    pub fn new(guard: CommandGuard) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl ActionHandler for ComputerHandler {
    async fn handle(
        &self,
        action: &Action,
        context: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let ActionPayload::Computer(command) = &action.payload else {
            return Err(HandlerError::invalid_payload(action, "computer command"));
        };

        // screened even when no collaborator is configured
        if let ComputerCommand::ExecuteCommand { command, .. } = command
            && let Some(pattern) = self.guard.blocked_by(command)
        {
            warn!(action_id = %action.id, command = %command, pattern, "Blocked command");
            return Err(HandlerError::BlockedCommand {
                command: command.clone(),
                pattern: pattern.to_string(),
            });
        }

        let computer = context
            .computer
            .as_ref()
            .ok_or(HandlerError::MissingCollaborator("computer control"))?;

        let payload = match command {
            ComputerCommand::ExecuteCommand {
                command,
                working_dir,
            } => {
                let output = computer
                    .execute_command(command, working_dir.as_deref())
                    .await
                    .map_err(HandlerError::collaborator("command execution"))?;
                if !output.success() {
                    return Err(HandlerError::Failed(format!(
                        "`{}` exited with {}: {}",
                        command,
                        output
                            .exit_code
                            .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                        truncate(output.stderr.trim(), 500)
                    )));
                }
                json!({
                    "command": command,
                    "exitCode": output.exit_code,
                    "stdout": truncate(&output.stdout, MAX_OUTPUT_LEN),
                    "stderr": truncate(&output.stderr, MAX_OUTPUT_LEN),
                })
            }
            ComputerCommand::Screenshot => {
                let shot = computer
                    .take_screenshot()
                    .await
                    .map_err(HandlerError::collaborator("screenshot"))?;
                json!({"mimeType": shot.mime_type, "bytes": shot.data.len()})
            }
            ComputerCommand::SendInput { input } => {
                computer
                    .send_input(input)
                    .await
                    .map_err(HandlerError::collaborator("input"))?;
                json!({"sent": input.len()})
            }
            ComputerCommand::ControlApp { app, operation } => {
                let result = computer
                    .control_app(app, operation)
                    .await
                    .map_err(HandlerError::collaborator("app control"))?;
                json!({"app": app, "operation": operation, "result": result})
            }
        };
        Ok(HandlerOutput::new(payload))
    }
}
