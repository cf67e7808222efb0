//! Structural remediation of dependency-blocked plans.
//!
//! When no pending step is runnable, the `unblock_plan` action asks the model
//! for per-step remediations. [`UnblockProposal::apply`] turns such a proposal
//! into the step list of the next plan version.

use super::entities::{Plan, Step, StepStatus};
use super::parser::{json_value_to_string, parse_step_json};
use crate::core::ids::StepId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What to do with one blocked step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationKind {
    /// Stop waiting for the step: dependents drop it from their dependencies
    Skip,
    /// Rewrite the step's text and/or dependencies
    Modify,
    /// Insert smaller steps before it and make it depend on them
    Split,
    /// Replace its dependency list
    Reorder,
}

impl RemediationKind {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "skip" | "remove" | "drop" => Some(RemediationKind::Skip),
            "modify" | "change" | "rewrite" => Some(RemediationKind::Modify),
            "split" | "decompose" => Some(RemediationKind::Split),
            "reorder" | "reorganize" => Some(RemediationKind::Reorder),
            _ => None,
        }
    }
}

/// One proposed fix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Remediation {
    pub step_id: StepId,
    pub kind: RemediationKind,
    pub new_title: Option<String>,
    pub new_description: Option<String>,
    pub new_dependencies: Option<Vec<StepId>>,
    pub new_steps: Vec<Step>,
}

/// A model-proposed restructuring of a blocked plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnblockProposal {
    pub analysis: String,
    pub remediations: Vec<Remediation>,
    /// Optional explicit ordering of step ids
    pub order: Vec<StepId>,
}

fn id_list(value: Option<&Value>) -> Option<Vec<StepId>> {
    value.and_then(Value::as_array).map(|deps| {
        deps.iter()
            .filter_map(json_value_to_string)
            .map(StepId::new)
            .collect()
    })
}

impl UnblockProposal {
    /// Lenient parse of `{analysis, remediations: [...], order?}`.
    pub fn from_json(json: &Value) -> Option<Self> {
        let entries = json
            .get("remediations")
            .or_else(|| json.get("actions"))
            .or_else(|| json.get("fixes"))
            .and_then(Value::as_array)?;

        let remediations: Vec<Remediation> = entries
            .iter()
            .filter_map(|entry| {
                let step_id = entry
                    .get("stepId")
                    .or_else(|| entry.get("step_id"))
                    .and_then(json_value_to_string)?;
                let kind = entry
                    .get("action")
                    .or_else(|| entry.get("kind"))
                    .and_then(Value::as_str)
                    .and_then(RemediationKind::parse)?;
                let new_steps = entry
                    .get("newSteps")
                    .or_else(|| entry.get("new_steps"))
                    .and_then(Value::as_array)
                    .map(|arr| {
                        arr.iter()
                            .enumerate()
                            .filter_map(|(i, s)| {
                                parse_step_json(s, i, false).map(|mut step| {
                                    if s.get("id").is_none() {
                                        step.id = StepId::new(format!("{}-part-{}", step_id, i + 1));
                                    }
                                    step
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Some(Remediation {
                    step_id: StepId::new(step_id),
                    kind,
                    new_title: entry.get("newTitle").and_then(json_value_to_string),
                    new_description: entry
                        .get("newDescription")
                        .or_else(|| entry.get("new_description"))
                        .and_then(json_value_to_string),
                    new_dependencies: id_list(
                        entry
                            .get("newDependencies")
                            .or_else(|| entry.get("new_dependencies")),
                    ),
                    new_steps,
                })
            })
            .collect();

        let order = id_list(json.get("order")).unwrap_or_default();
        if remediations.is_empty() && order.is_empty() {
            return None;
        }

        Some(Self {
            analysis: json
                .get("analysis")
                .and_then(json_value_to_string)
                .unwrap_or_default(),
            remediations,
            order,
        })
    }

    /// Produce the step list for the next plan version, or `None` when the
    /// proposal does not touch any step of `plan`.
    pub fn apply(&self, plan: &Plan) -> Option<Vec<Step>> {
        let mut steps = carry_over(&plan.steps);
        let mut changed = false;

        for fix in &self.remediations {
            let Some(pos) = steps.iter().position(|s| s.id == fix.step_id) else {
                continue;
            };
            changed = true;
            match fix.kind {
                RemediationKind::Skip => {
                    // the superseded version still records the skipped step
                    steps.remove(pos);
                    for step in steps.iter_mut() {
                        step.dependencies.retain(|d| d != &fix.step_id);
                    }
                }
                RemediationKind::Modify | RemediationKind::Reorder => {
                    let step = &mut steps[pos];
                    if let Some(title) = &fix.new_title {
                        step.title = title.clone();
                    }
                    if let Some(description) = &fix.new_description {
                        step.description = description.clone();
                    }
                    if let Some(deps) = &fix.new_dependencies {
                        step.dependencies = deps.clone();
                    }
                }
                RemediationKind::Split => {
                    if fix.new_steps.is_empty() {
                        continue;
                    }
                    let part_ids: Vec<StepId> = fix.new_steps.iter().map(|s| s.id.clone()).collect();
                    steps[pos].dependencies = part_ids;
                    for (offset, part) in fix.new_steps.iter().enumerate() {
                        steps.insert(pos + offset, part.clone());
                    }
                }
            }
        }

        if !self.order.is_empty() {
            let mut ordered: Vec<Step> = Vec::with_capacity(steps.len());
            for id in &self.order {
                if let Some(pos) = steps.iter().position(|s| &s.id == id) {
                    ordered.push(steps.remove(pos));
                    changed = true;
                }
            }
            ordered.append(&mut steps);
            steps = ordered;
        }

        changed.then_some(steps)
    }
}

/// Copy steps into a new plan version.
///
/// Completed steps keep their status; anything that did not finish
/// (in progress or blocked) starts over as pending in the new version.
pub fn carry_over(steps: &[Step]) -> Vec<Step> {
    steps
        .iter()
        .cloned()
        .map(|mut step| {
            if step.status != StepStatus::Completed {
                step.status = StepStatus::Pending;
            }
            step
        })
        .collect()
}
