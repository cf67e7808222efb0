//! Plan parsing from structured model output.
//!
//! Turns an already-extracted JSON value (see [`crate::structured`]) into
//! [`Step`]s. The parser is lenient about shape: step arrays may live under
//! `steps`, `plan.steps` or be the top-level value; ids may be numbers;
//! missing fields get defaults.

use super::entities::{Complexity, Step, StepStatus, StepType};
use crate::core::ids::StepId;
use serde_json::Value;

/// Title/description pulled from a plan-shaped JSON object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanHeader {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Convert a JSON value to a string (numbers too; null and empty strings are None)
pub(crate) fn json_value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_field(json: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| json.get(*k).and_then(json_value_to_string))
}

/// Locate the step array inside a plan-shaped value.
fn step_array(json: &Value) -> Option<&Vec<Value>> {
    if let Some(arr) = json.as_array() {
        return Some(arr);
    }
    json.get("steps")
        .and_then(Value::as_array)
        .or_else(|| json.get("plan").and_then(|p| p.get("steps")).and_then(Value::as_array))
        .or_else(|| json.get("tasks").and_then(Value::as_array))
}

/// Read the plan title/description if present.
pub fn parse_plan_header(json: &Value) -> PlanHeader {
    let root = json.get("plan").filter(|p| p.is_object()).unwrap_or(json);
    PlanHeader {
        title: string_field(root, &["title", "objective", "name"]),
        description: string_field(root, &["description", "summary", "reasoning"]),
    }
}

/// Parse one step; `index` is used for the fallback id.
///
/// When `keep_status` is false every step starts `pending`.
pub fn parse_step_json(json: &Value, index: usize, keep_status: bool) -> Option<Step> {
    let title = string_field(json, &["title", "name"]);
    let description = string_field(json, &["description", "details"]);
    let title = title.or_else(|| description.clone())?;

    let id = string_field(json, &["id", "stepId", "step_id"])
        .unwrap_or_else(|| format!("step-{}", index + 1));

    let step_type = json
        .get("type")
        .or_else(|| json.get("stepType"))
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<StepType>().ok())
        .unwrap_or_default();

    let mut step = Step::new(StepId::new(id), title.clone(), step_type)
        .with_description(description.unwrap_or(title));

    if let Some(deps) = json
        .get("dependencies")
        .or_else(|| json.get("depends_on"))
        .or_else(|| json.get("dependsOn"))
        .and_then(Value::as_array)
    {
        for dep in deps {
            if let Some(dep_id) = json_value_to_string(dep) {
                step = step.with_dependency(dep_id);
            }
        }
    }

    let complexity = json
        .get("estimatedComplexity")
        .or_else(|| json.get("estimated_complexity"))
        .or_else(|| json.get("complexity"))
        .and_then(json_value_to_string)
        .map(|s| Complexity::parse_lenient(&s))
        .unwrap_or_default();
    step = step.with_complexity(complexity);

    if keep_status
        && let Some(status) = json
            .get("status")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<StepStatus>().ok())
    {
        step.status = status;
    }

    Some(step)
}

/// Parse every step of a plan-shaped value.
///
/// Returns `None` when no step array is found or none of its entries is usable.
pub fn parse_steps(json: &Value, keep_status: bool) -> Option<Vec<Step>> {
    let raw = step_array(json)?;
    let steps: Vec<Step> = raw
        .iter()
        .enumerate()
        .filter_map(|(i, s)| parse_step_json(s, i, keep_status))
        .collect();
    if steps.is_empty() { None } else { Some(steps) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_steps_full_schema() {
        let value = json!({
            "title": "Todo app",
            "description": "Build it",
            "steps": [
                {"id": "step1", "title": "Research", "description": "Look at frameworks",
                 "type": "research", "dependencies": [], "estimatedComplexity": "low"},
                {"id": "step2", "title": "Build", "description": "Write the code",
                 "type": "implementation", "dependencies": ["step1"], "estimatedComplexity": "high"}
            ]
        });
        let steps = parse_steps(&value, false).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step_type, StepType::Research);
        assert_eq!(steps[0].estimated_complexity, Complexity::Low);
        assert_eq!(steps[1].dependencies, vec![StepId::new("step1")]);

        let header = parse_plan_header(&value);
        assert_eq!(header.title.as_deref(), Some("Todo app"));
    }

    #[test]
    fn test_parse_steps_numeric_ids_and_missing_fields() {
        let value = json!([
            {"id": 1, "title": "First"},
            {"description": "Only a description", "depends_on": [1]}
        ]);
        let steps = parse_steps(&value, false).unwrap();
        assert_eq!(steps[0].id, StepId::new("1"));
        assert_eq!(steps[1].id, StepId::new("step-2"));
        assert_eq!(steps[1].title, "Only a description");
        assert_eq!(steps[1].dependencies, vec![StepId::new("1")]);
        assert_eq!(steps[1].step_type, StepType::Implementation);
    }

    #[test]
    fn test_parse_steps_status_only_kept_when_requested() {
        let value = json!({"steps": [{"id": "a", "title": "A", "status": "completed"}]});
        assert_eq!(parse_steps(&value, false).unwrap()[0].status, StepStatus::Pending);
        assert_eq!(parse_steps(&value, true).unwrap()[0].status, StepStatus::Completed);
    }

    #[test]
    fn test_parse_steps_nested_plan_key() {
        let value = json!({"plan": {"title": "Nested", "steps": [{"title": "Only"}]}});
        assert_eq!(parse_steps(&value, false).unwrap().len(), 1);
        assert_eq!(parse_plan_header(&value).title.as_deref(), Some("Nested"));
    }

    #[test]
    fn test_parse_steps_empty_returns_none() {
        assert!(parse_steps(&json!({"steps": []}), false).is_none());
        assert!(parse_steps(&json!({"steps": [{"id": "x"}]}), false).is_none());
        assert!(parse_steps(&json!({"answer": 42}), false).is_none());
    }
}
