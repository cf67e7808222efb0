//! File-producing handler shared by `generate_code`, `architecture`,
//! `testing` and `deployment`.

use super::{ActionHandler, ExecutionContext, HandlerError, HandlerOutput};
use async_trait::async_trait;
use serde_json::{Value, json};
use taskpilot_domain::core::string::slugify;
use taskpilot_domain::structured::{
    extension_for_language, extract_code_blocks, extract_from_response, is_extraction_failure,
};
use taskpilot_domain::{
    Action, ActionKind, ActionPayload, Artifact, CompletionOptions, CompletionResponse,
    PromptTemplate,
};
use tracing::{info, warn};

/// A file the model asked for
#[derive(Debug, Clone, PartialEq)]
struct GeneratedFile {
    path: String,
    code: String,
    description: Option<String>,
}

pub struct CodeHandler;

#[async_trait]
impl ActionHandler for CodeHandler {
    async fn handle(
        &self,
        action: &Action,
        context: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let ActionPayload::Code(request) = &action.payload else {
            return Err(HandlerError::invalid_payload(action, "code request"));
        };

        let options = CompletionOptions::default().with_system(PromptTemplate::code_system(action.kind));
        let response = context
            .completion
            .complete_structured(&PromptTemplate::code_generation(action.kind, request), &options)
            .await?;

        let fallback_stem = if request.step_title.is_empty() {
            action.kind.as_str().to_string()
        } else {
            slugify(&request.step_title)
        };
        let (files, structured, notes) = interpret(&response, &fallback_stem);

        let mut artifacts = Vec::new();
        if files.is_empty() {
            // design and deployment steps may legitimately answer in prose
            let text = match &structured {
                Some(value) => serde_json::to_string_pretty(value).unwrap_or_default(),
                None => response.as_text(),
            };
            if !matches!(action.kind, ActionKind::Architecture | ActionKind::Deployment)
                || text.trim().is_empty()
            {
                return Err(HandlerError::Failed(format!(
                    "{} response contained no files",
                    action.kind
                )));
            }
            let mut document = Artifact::document(action.task_id.clone(), text)
                .with_description(action.description.clone());
            if let Some(step_id) = &action.step_id {
                document = document.with_step(step_id.clone());
            }
            context.memory.store_artifact(&document);
            artifacts.push(document);
            return Ok(HandlerOutput::new(json!({
                "files": [],
                "document": true,
                "notes": notes,
            }))
            .with_artifacts(artifacts));
        }

        let mut write_failures = Vec::new();
        for file in &files {
            let mut artifact = Artifact::code(action.task_id.clone(), &file.path, &file.code);
            if let Some(step_id) = &action.step_id {
                artifact = artifact.with_step(step_id.clone());
            }
            if let Some(description) = &file.description {
                artifact = artifact.with_description(description.clone());
            }
            context.memory.store_artifact(&artifact);
            artifacts.push(artifact);

            if let Some(fs) = &context.file_system
                && let Err(e) = fs.write_file(&file.path, &file.code).await
            {
                warn!(path = %file.path, error = %e, "Failed to write generated file");
                write_failures.push(json!({"path": file.path, "error": e.to_string()}));
            }
        }

        info!(
            action_id = %action.id,
            files = files.len(),
            recovered = structured.is_none(),
            "Generated files"
        );
        Ok(HandlerOutput::new(json!({
            "files": files
                .iter()
                .map(|f| json!({"path": f.path, "description": f.description}))
                .collect::<Vec<_>>(),
            "recoveredFromText": structured.is_none(),
            "writeFailures": write_failures,
            "notes": notes,
        }))
        .with_artifacts(artifacts))
    }
}

/// Files from a `files[]` structure, else from fenced code blocks.
///
/// Returns the files, the structured value when extraction succeeded, and
/// any explanation text.
fn interpret(response: &CompletionResponse, fallback_stem: &str) -> (Vec<GeneratedFile>, Option<Value>, Option<String>) {
    let structured = extract_from_response(response)
        .ok()
        .filter(|v| !is_extraction_failure(v));

    if let Some(value) = &structured {
        let files = files_from_json(value);
        if !files.is_empty() {
            let notes = ["explanation", "notes", "summary"]
                .iter()
                .find_map(|k| value.get(*k).and_then(Value::as_str))
                .map(str::to_string);
            return (files, structured, notes);
        }
    }

    let files: Vec<GeneratedFile> = extract_code_blocks(&response.as_text())
        .into_iter()
        .enumerate()
        .map(|(i, block)| GeneratedFile {
            path: block.path_hint.clone().unwrap_or_else(|| {
                format!(
                    "generated/{}-{}.{}",
                    fallback_stem,
                    i + 1,
                    extension_for_language(block.language.as_deref())
                )
            }),
            code: block.code,
            description: None,
        })
        .collect();
    if files.is_empty() {
        return (files, structured, None);
    }
    (files, None, None)
}

fn files_from_json(value: &Value) -> Vec<GeneratedFile> {
    let entries = value
        .get("files")
        .and_then(Value::as_array)
        .or_else(|| value.as_array());
    let Some(entries) = entries else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let field = |keys: &[&str]| {
                keys.iter()
                    .find_map(|k| entry.get(*k).and_then(Value::as_str))
                    .map(str::to_string)
            };
            let path = field(&["path", "filename", "file", "name"])?;
            let code = field(&["code", "content", "contents"])?;
            Some(GeneratedFile {
                path: path.trim().trim_start_matches("./").to_string(),
                code,
                description: field(&["description", "summary"]),
            })
        })
        .filter(|f| !f.path.is_empty())
        .collect()
}
