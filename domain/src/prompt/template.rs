//! Prompt templates for the agent loop

use crate::action::{ActionKind, CodeRequest, HistoryEntry, UnblockRequest};
use crate::artifact::Artifact;
use crate::core::string::truncate;
use crate::plan::Plan;
use crate::task::Task;

/// Longest artifact/file excerpt embedded in a prompt
const EXCERPT_LEN: usize = 1500;

/// Templates for generating prompts at each stage of a cycle
pub struct PromptTemplate;

impl PromptTemplate {
    /// System prompt for planning and revision calls
    pub fn planner_system() -> &'static str {
        r#"You are a senior software engineer who breaks development tasks into small, concrete steps.
Each step has a type (research, architecture, implementation, testing, deployment) and may depend on earlier steps.
Respond with JSON only."#
    }

    /// Initial decomposition of a task
    pub fn initial_plan(task: &Task) -> String {
        format!(
            r#"Create a step-by-step plan for the following task.

Task:
{}

Respond with a JSON object of this shape:
{{
  "title": "short plan title",
  "description": "one paragraph overview",
  "steps": [
    {{
      "id": "step-1",
      "title": "short title",
      "description": "what to do in this step",
      "type": "research | architecture | implementation | testing | deployment",
      "dependencies": ["ids of steps that must finish first"],
      "estimatedComplexity": "low | medium | high"
    }}
  ]
}}

Keep dependencies acyclic and reference only ids from this plan."#,
            task.to_prompt_context()
        )
    }

    /// Revision of the active plan given new insights
    pub fn revise_plan(task: &Task, plan: &Plan, insights: &str) -> String {
        format!(
            r#"The plan for this task needs to be revised.

Task:
{}

Current plan:
{}

New insights:
{}

Return the complete updated step list as JSON ({{"steps": [...]}}, same step schema as before).
Keep the ids of steps you retain; completed steps must keep "status": "completed".
Give new steps new ids."#,
            task.to_prompt_context(),
            plan.to_prompt_context(),
            insights
        )
    }

    pub fn unblock_system() -> &'static str {
        r#"You are diagnosing a stalled plan: every remaining step waits on a dependency that is not completed.
Propose structural fixes. Respond with JSON only."#
    }

    /// Analysis of dependency-blocked steps
    pub fn unblock_plan(request: &UnblockRequest) -> String {
        let blocked = request
            .blocked
            .iter()
            .map(|b| {
                format!(
                    "- {} \"{}\": waiting on [{}]\n  {}",
                    b.step_id,
                    b.title,
                    b.missing_dependencies
                        .iter()
                        .map(|d| d.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                    b.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"{}

Blocked steps (attempt {}):
{}

For each blocked step choose one remediation:
- "skip": the step is not needed; it is dropped and other steps stop waiting for it
- "modify": rewrite the description and/or dependencies
- "split": replace it with smaller steps that can run now
- "reorder": give it a new dependency list

Respond with:
{{
  "analysis": "why the plan is stuck",
  "remediations": [
    {{"stepId": "...", "action": "skip | modify | split | reorder",
      "newDescription": "optional", "newDependencies": ["optional"],
      "newSteps": [{{"id": "...", "title": "...", "description": "...", "type": "..."}}]}}
  ],
  "order": ["optional step ids in execution order"]
}}"#,
            request.plan_context, request.attempt, blocked
        )
    }

    /// System prompt for the file-producing actions
    pub fn code_system(kind: ActionKind) -> &'static str {
        match kind {
            ActionKind::Architecture => {
                "You are a software architect. Produce design documents and skeleton files. Respond with JSON only."
            }
            ActionKind::Testing => {
                "You are a test engineer. Write thorough, runnable tests. Respond with JSON only."
            }
            ActionKind::Deployment => {
                "You are a DevOps engineer. Produce deployment configuration and scripts. Respond with JSON only."
            }
            _ => "You are an expert programmer. Write complete, working code. Respond with JSON only.",
        }
    }

    /// One file-producing request
    pub fn code_generation(kind: ActionKind, request: &CodeRequest) -> String {
        let mut prompt = format!(
            "Task: {}\n\nCurrent step: {}\n{}\n",
            request.task_description, request.step_title, request.step_description
        );

        if !request.requirements.is_empty() {
            prompt.push_str("\nRequirements:\n");
            for requirement in &request.requirements {
                prompt.push_str(&format!("- {}\n", requirement));
            }
        }

        if !request.project_structure.is_empty() {
            prompt.push_str("\nProject files:\n");
            for path in request.project_structure.iter().take(100) {
                prompt.push_str(&format!("- {}\n", path));
            }
        }

        if !request.dependency_artifacts.is_empty() {
            prompt.push_str("\nOutputs of earlier steps:\n");
            for artifact in &request.dependency_artifacts {
                prompt.push_str(&Self::artifact_excerpt(artifact));
            }
        }

        if !request.relevant_code.is_empty() {
            prompt.push_str("\nRelevant existing code:\n");
            for file in &request.relevant_code {
                prompt.push_str(&format!(
                    "--- {} ---\n{}\n",
                    file.path,
                    truncate(&file.content, EXCERPT_LEN)
                ));
            }
        }

        let focus = match kind {
            ActionKind::Architecture => "the architecture documents and skeleton files",
            ActionKind::Testing => "the test files",
            ActionKind::Deployment => "the deployment files",
            _ => "the source files",
        };
        prompt.push_str(&format!(
            r#"
Write {focus} for this step. Respond with:
{{
  "files": [
    {{"path": "relative/path.ext", "code": "full file content", "description": "what it does"}}
  ],
  "explanation": "short summary"
}}"#
        ));
        prompt
    }

    fn artifact_excerpt(artifact: &Artifact) -> String {
        let label = artifact
            .path
            .clone()
            .unwrap_or_else(|| artifact.kind.as_str().to_string());
        format!(
            "--- {} ---\n{}\n",
            label,
            truncate(artifact.content.as_deref().unwrap_or(""), EXCERPT_LEN)
        )
    }

    pub fn research_system() -> &'static str {
        "You are a technical researcher. Answer precisely and cite concrete APIs, libraries and versions."
    }

    /// A single research question, optionally with fetched page content
    pub fn research_query(query: &str, context: &str, sources: &[(String, String)]) -> String {
        let mut prompt = format!("Context: {}\n\nResearch question: {}\n", context, query);
        if !sources.is_empty() {
            prompt.push_str("\nSources:\n");
            for (url, text) in sources {
                prompt.push_str(&format!("--- {} ---\n{}\n", url, truncate(text, EXCERPT_LEN)));
            }
        }
        prompt.push_str("\nExtract the information relevant to the question.");
        prompt
    }

    /// Synthesis of the per-query findings into one report
    pub fn research_synthesis(context: &str, findings: &[(String, String)]) -> String {
        let body = findings
            .iter()
            .map(|(query, finding)| format!("## {}\n{}", query, truncate(finding, EXCERPT_LEN)))
            .collect::<Vec<_>>()
            .join("\n\n");
        format!(
            r#"Context: {}

Findings:
{}

Synthesize the findings. Respond with JSON:
{{"summary": "...", "keyFindings": ["..."], "technicalDetails": ["..."], "recommendations": ["..."]}}"#,
            context, body
        )
    }

    pub fn reflector_system() -> &'static str {
        r#"You review the progress of an autonomous development agent and decide whether its plan is still viable.
Respond with JSON only."#
    }

    /// Reflection on the latest result
    pub fn reflection(plan: &Plan, latest: &HistoryEntry, history: &[HistoryEntry]) -> String {
        let recent = history
            .iter()
            .map(HistoryEntry::to_prompt_line)
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            r#"{}

Latest action:
{}

Recent history (most recent first):
{}

Respond with:
{{
  "needsPlanRevision": false,
  "needsResearch": false,
  "researchQueries": [],
  "insights": ["..."],
  "recommendation": "...",
  "planRevisionStrategy": "optional",
  "confidence": 0.0
}}"#,
            plan.to_prompt_context(),
            latest.to_prompt_line(),
            recent
        )
    }

    /// Final report for a finished task
    pub fn final_report(task: &Task, plan: &Plan, artifacts: &[Artifact]) -> String {
        let files = artifacts
            .iter()
            .filter_map(|a| a.path.as_deref())
            .map(|p| format!("- {}", p))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            r#"The following task has finished.

Task:
{}

{}

Files produced:
{}

Write a final report as JSON:
{{
  "summary": "...",
  "accomplishments": ["..."],
  "components": ["..."],
  "challenges": ["..."],
  "codeQuality": "...",
  "futureImprovements": ["..."]
}}"#,
            task.to_prompt_context(),
            plan.to_prompt_context(),
            if files.is_empty() { "(none)".to_string() } else { files }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::BlockedStep;
    use crate::core::ids::{StepId, TaskId};
    use crate::plan::{Step, StepType};

    #[test]
    fn test_initial_plan_mentions_task_and_schema() {
        let task = Task::new("Build a REST API").with_requirement("Use Rust");
        let prompt = PromptTemplate::initial_plan(&task);
        assert!(prompt.contains("Build a REST API"));
        assert!(prompt.contains("- Use Rust"));
        assert!(prompt.contains("\"estimatedComplexity\""));
    }

    #[test]
    fn test_unblock_prompt_lists_missing_dependencies() {
        let request = UnblockRequest {
            plan_context: "Plan: x".to_string(),
            blocked: vec![BlockedStep {
                step_id: StepId::new("a"),
                title: "A".to_string(),
                description: "do A".to_string(),
                missing_dependencies: vec![StepId::new("b")],
            }],
            attempt: 2,
        };
        let prompt = PromptTemplate::unblock_plan(&request);
        assert!(prompt.contains("waiting on [b]"));
        assert!(prompt.contains("attempt 2"));
    }

    #[test]
    fn test_code_prompt_focus_by_kind() {
        let request = CodeRequest {
            step_title: "Tests".to_string(),
            ..CodeRequest::default()
        };
        assert!(PromptTemplate::code_generation(ActionKind::Testing, &request).contains("the test files"));
        assert!(
            PromptTemplate::code_generation(ActionKind::GenerateCode, &request)
                .contains("the source files")
        );
    }

    #[test]
    fn test_final_report_lists_files() {
        let task = Task::new("t");
        let plan = Plan::new(
            TaskId::new("t"),
            "p",
            "",
            vec![Step::new("s", "S", StepType::Implementation)],
        );
        let artifacts = vec![Artifact::code(TaskId::new("t"), "src/lib.rs", "")];
        assert!(PromptTemplate::final_report(&task, &plan, &artifacts).contains("- src/lib.rs"));
        assert!(PromptTemplate::final_report(&task, &plan, &[]).contains("(none)"));
    }
}
