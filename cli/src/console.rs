//! Terminal output: live progress lines and the final report

use colored::Colorize;
use serde_json::{Value, json};
use taskpilot_application::{LifecycleNotifier, RunTaskOutput};
use taskpilot_domain::{LifecycleEvent, StepStatus, TaskStatus};

/// Prints one line per lifecycle event to stderr
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    fn describe(event: &LifecycleEvent) -> String {
        match event {
            LifecycleEvent::TaskStarted { description, .. } => {
                format!("{} {}", "▶ Task".bold().cyan(), description)
            }
            LifecycleEvent::PlanCreated { step_count, .. } => {
                format!("{} {} step(s)", "📝 Plan".bold(), step_count)
            }
            LifecycleEvent::ActionSelected {
                kind,
                step_id,
                forced_progress,
                ..
            } => {
                let step = step_id
                    .as_ref()
                    .map(|s| format!(" [{}]", s))
                    .unwrap_or_default();
                let forced = if *forced_progress {
                    format!(" {}", "(dependencies bypassed)".yellow())
                } else {
                    String::new()
                };
                format!("  {} {}{}{}", "→".dimmed(), kind, step, forced)
            }
            LifecycleEvent::ActionExecuted {
                kind,
                artifact_count,
                ..
            } => {
                let artifacts = match artifact_count {
                    0 => String::new(),
                    n => format!(" ({} artifact(s))", n),
                };
                format!("  {} {}{}", "✓".green(), kind, artifacts)
            }
            LifecycleEvent::ActionFailed { kind, error, .. } => {
                format!("  {} {}: {}", "✗".red(), kind, error)
            }
            LifecycleEvent::PlanRevised { reason, .. } => {
                format!("{} {}", "🔄 Plan revised:".yellow().bold(), reason)
            }
            LifecycleEvent::ReflectionComplete {
                needs_plan_revision,
                needs_research,
                confidence,
                ..
            } => format!(
                "  {} revise={} research={} confidence={:.0}%",
                "💭".dimmed(),
                needs_plan_revision,
                needs_research,
                confidence * 100.0
            ),
            LifecycleEvent::TaskCompleted { .. } => format!("{}", "🎉 Task completed".green().bold()),
            LifecycleEvent::TaskFailed { error, .. } => {
                format!("{} {}", "❌ Task failed:".red().bold(), error)
            }
            LifecycleEvent::TaskStopped { iterations, .. } => format!(
                "{} after {} iteration(s)",
                "⏹ Task stopped".yellow().bold(),
                iterations
            ),
        }
    }
}

impl LifecycleNotifier for ConsoleNotifier {
    fn notify(&self, event: &LifecycleEvent) {
        eprintln!("{}", Self::describe(event));
    }
}

fn section(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n{}\n", title.bold()));
    for item in items {
        out.push_str(&format!("  • {}\n", item));
    }
}

/// Human-readable summary of a finished run
pub fn render_report(output: &RunTaskOutput) -> String {
    let mut out = String::new();
    let status = match output.task.status {
        TaskStatus::Completed => "COMPLETED".green().bold(),
        TaskStatus::Failed if output.stopped => "STOPPED".yellow().bold(),
        TaskStatus::Failed => "FAILED".red().bold(),
        _ => output.task.status.as_str().to_uppercase().normal(),
    };
    let progress = output.plan.progress();

    out.push_str(&format!("\n{} {}\n", "Status:".bold(), status));
    out.push_str(&format!("{} {}\n", "Task:".bold(), output.task.description()));
    out.push_str(&format!(
        "{} {} ({}/{} steps, {} iteration(s))\n",
        "Plan:".bold(),
        output.plan.title,
        progress.completed,
        progress.total,
        output.iterations
    ));
    if let Some(error) = &output.task.error {
        out.push_str(&format!("{} {}\n", "Error:".bold(), error.red()));
    }

    let unfinished: Vec<String> = output
        .plan
        .steps
        .iter()
        .filter(|s| s.status != StepStatus::Completed)
        .map(|s| format!("{} ({})", s.title, s.status))
        .collect();
    section(&mut out, "Unfinished steps", &unfinished);

    if let Some(report) = &output.report {
        out.push_str(&format!("\n{}\n{}\n", "Summary".bold().underline(), report.summary));
        section(&mut out, "Accomplishments", &report.accomplishments);
        section(&mut out, "Components", &report.components);
        section(&mut out, "Challenges", &report.challenges);
        if let Some(quality) = &report.code_quality {
            out.push_str(&format!("\n{}\n  {}\n", "Code quality".bold(), quality));
        }
        section(&mut out, "Future improvements", &report.future_improvements);
    }

    out
}

/// Machine-readable summary of a finished run
pub fn render_json(output: &RunTaskOutput) -> Value {
    let progress = output.plan.progress();
    json!({
        "taskId": output.task.id,
        "status": output.task.status.as_str(),
        "stopped": output.stopped,
        "error": output.task.error,
        "iterations": output.iterations,
        "plan": {
            "id": output.plan.id,
            "title": output.plan.title,
            "completedSteps": progress.completed,
            "totalSteps": progress.total,
        },
        "report": output.report,
        "actions": output.history.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskpilot_domain::{FinalReport, Plan, Step, StepType, Task, TaskId};

    fn output(completed: bool) -> RunTaskOutput {
        let mut task = Task::new("Build a greeter");
        task.activate().unwrap();
        let mut plan = Plan::new(
            task.id.clone(),
            "Greeter",
            "",
            vec![
                Step::new("s1", "Write main.rs", StepType::Implementation),
                Step::new("s2", "Add tests", StepType::Testing),
            ],
        );
        plan.start_step(&"s1".into()).unwrap();
        plan.complete_step(&"s1".into()).unwrap();
        let report = if completed {
            task.complete().unwrap();
            Some(FinalReport {
                summary: "Greeter built".into(),
                accomplishments: vec!["main.rs".into()],
                ..Default::default()
            })
        } else {
            task.fail("Iteration limit reached (2)").unwrap();
            None
        };
        RunTaskOutput {
            task,
            plan,
            report,
            history: Vec::new(),
            iterations: 2,
            stopped: false,
        }
    }

    #[test]
    fn test_render_report() {
        colored::control::set_override(false);

        let text = render_report(&output(true));
        assert!(text.contains("Status: COMPLETED"));
        assert!(text.contains("(1/2 steps, 2 iteration(s))"));
        assert!(text.contains("Add tests (pending)"));
        assert!(text.contains("Greeter built"));
        assert!(text.contains("  • main.rs"));

        let text = render_report(&output(false));
        assert!(text.contains("Status: FAILED"));
        assert!(text.contains("Error: Iteration limit reached (2)"));
    }

    #[test]
    fn test_render_json() {
        let value = render_json(&output(true));
        assert_eq!(value["status"], "completed");
        assert_eq!(value["plan"]["completedSteps"], 1);
        assert_eq!(value["report"]["summary"], "Greeter built");
    }

    #[test]
    fn test_describe_events() {
        colored::control::set_override(false);
        let line = ConsoleNotifier::describe(&LifecycleEvent::TaskStopped {
            task_id: TaskId::new("t"),
            iterations: 3,
        });
        assert_eq!(line, "⏹ Task stopped after 3 iteration(s)");
    }
}
