//! Reflections and final reports.

use crate::core::ids::{ActionId, ReflectionId, TaskId};
use crate::plan::parser::json_value_to_string;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a reflection came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionSource {
    /// Rule-based, no completion call
    Heuristic,
    /// Produced by the completion service
    Model,
}

/// Assessment of whether the current plan remains viable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub id: ReflectionId,
    pub task_id: TaskId,
    pub action_id: Option<ActionId>,
    pub needs_plan_revision: bool,
    pub needs_research: bool,
    pub research_queries: Vec<String>,
    pub insights: Vec<String>,
    pub recommendation: String,
    pub plan_revision_strategy: Option<String>,
    /// 0.0–1.0
    pub confidence: f64,
    pub is_final: bool,
    pub source: ReflectionSource,
    pub timestamp: DateTime<Utc>,
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(json_value_to_string).collect(),
        Some(other) => json_value_to_string(other).into_iter().collect(),
        None => Vec::new(),
    }
}

fn flag(json: &Value, keys: &[&str]) -> bool {
    keys.iter().find_map(|k| json.get(*k)).is_some_and(|v| match v {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes"),
        _ => false,
    })
}

impl Reflection {
    fn base(task_id: TaskId, source: ReflectionSource) -> Self {
        Self {
            id: ReflectionId::generate(),
            task_id,
            action_id: None,
            needs_plan_revision: false,
            needs_research: false,
            research_queries: Vec::new(),
            insights: Vec::new(),
            recommendation: String::new(),
            plan_revision_strategy: None,
            confidence: 0.5,
            is_final: false,
            source,
            timestamp: Utc::now(),
        }
    }

    /// Cheap rule-based reflection: revise only when the action failed.
    pub fn heuristic(task_id: TaskId, action_id: Option<ActionId>, succeeded: bool) -> Self {
        let mut reflection = Self::base(task_id, ReflectionSource::Heuristic);
        reflection.action_id = action_id;
        if succeeded {
            reflection.recommendation = "Continue with the current plan".to_string();
            reflection.confidence = 0.7;
        } else {
            reflection.needs_plan_revision = true;
            reflection.insights.push("The last action failed".to_string());
            reflection.recommendation =
                "Revise the plan to work around the failed step".to_string();
            reflection.confidence = 0.4;
        }
        reflection
    }

    /// Lenient parse of model output
    /// (`{needsPlanRevision, needsResearch, researchQueries, insights, recommendation,
    /// planRevisionStrategy, confidence}`).
    ///
    /// Returns `None` if the value carries none of the decision fields.
    pub fn from_json(task_id: TaskId, action_id: Option<ActionId>, json: &Value) -> Option<Self> {
        let known = [
            "needsPlanRevision",
            "needs_plan_revision",
            "needsResearch",
            "needs_research",
            "insights",
            "recommendation",
        ];
        if !known.iter().any(|k| json.get(*k).is_some()) {
            return None;
        }

        let mut reflection = Self::base(task_id, ReflectionSource::Model);
        reflection.action_id = action_id;
        reflection.needs_plan_revision = flag(json, &["needsPlanRevision", "needs_plan_revision"]);
        reflection.needs_research = flag(json, &["needsResearch", "needs_research"]);
        reflection.research_queries =
            string_list(json.get("researchQueries").or_else(|| json.get("research_queries")));
        reflection.insights = string_list(json.get("insights"));
        reflection.recommendation = json
            .get("recommendation")
            .and_then(json_value_to_string)
            .unwrap_or_default();
        reflection.plan_revision_strategy = json
            .get("planRevisionStrategy")
            .or_else(|| json.get("plan_revision_strategy"))
            .and_then(json_value_to_string);
        if let Some(confidence) = json.get("confidence").and_then(Value::as_f64) {
            // Accept both 0–1 and 0–100 scales
            let scaled = if confidence > 1.0 { confidence / 100.0 } else { confidence };
            reflection.confidence = scaled.clamp(0.0, 1.0);
        }
        if reflection.needs_research && reflection.research_queries.is_empty() {
            reflection.needs_research = false;
        }
        Some(reflection)
    }

    /// A final reflection summarizing a finished task
    pub fn final_for(task_id: TaskId, report: &FinalReport) -> Self {
        let mut reflection = Self::base(task_id, ReflectionSource::Model);
        reflection.is_final = true;
        reflection.insights = report.accomplishments.clone();
        reflection.recommendation = report.summary.clone();
        reflection.confidence = 1.0;
        reflection
    }

    /// Insight text fed into a plan revision
    pub fn revision_insights(&self) -> String {
        let mut out = self.insights.join("\n");
        if let Some(strategy) = &self.plan_revision_strategy {
            out.push_str(&format!("\nSuggested strategy: {}", strategy));
        }
        if !self.recommendation.is_empty() {
            out.push_str(&format!("\nRecommendation: {}", self.recommendation));
        }
        out.trim().to_string()
    }
}

/// Summary of a completed task
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FinalReport {
    pub summary: String,
    pub accomplishments: Vec<String>,
    pub components: Vec<String>,
    pub challenges: Vec<String>,
    pub code_quality: Option<String>,
    pub future_improvements: Vec<String>,
    /// True when the report is the minimal acknowledgment
    pub degraded: bool,
}

impl FinalReport {
    pub fn from_json(json: &Value) -> Option<Self> {
        let summary = json
            .get("summary")
            .or_else(|| json.get("overview"))
            .and_then(json_value_to_string)?;
        Some(Self {
            summary,
            accomplishments: string_list(json.get("accomplishments")),
            components: string_list(json.get("components")),
            challenges: string_list(json.get("challenges")),
            code_quality: json
                .get("codeQuality")
                .or_else(|| json.get("code_quality"))
                .and_then(json_value_to_string),
            future_improvements: string_list(
                json.get("futureImprovements")
                    .or_else(|| json.get("future_improvements")),
            ),
            degraded: false,
        })
    }

    /// Minimal acknowledgment used when no report could be generated
    pub fn acknowledgment(task_description: &str, completed: usize, total: usize) -> Self {
        Self {
            summary: format!(
                "Task finished: {} ({} of {} steps completed)",
                task_description, completed, total
            ),
            degraded: true,
            ..Self::default()
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut out = format!("# Final report\n\n{}\n", self.summary);
        let sections: [(&str, &Vec<String>); 4] = [
            ("Accomplishments", &self.accomplishments),
            ("Components", &self.components),
            ("Challenges", &self.challenges),
            ("Future improvements", &self.future_improvements),
        ];
        for (heading, items) in sections {
            if items.is_empty() {
                continue;
            }
            out.push_str(&format!("\n## {}\n", heading));
            for item in items {
                out.push_str(&format!("- {}\n", item));
            }
        }
        if let Some(quality) = &self.code_quality {
            out.push_str(&format!("\n## Code quality\n{}\n", quality));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_heuristic_reflection() {
        let ok = Reflection::heuristic(TaskId::new("t"), None, true);
        assert!(!ok.needs_plan_revision);
        assert_eq!(ok.source, ReflectionSource::Heuristic);

        let failed = Reflection::heuristic(TaskId::new("t"), None, false);
        assert!(failed.needs_plan_revision);
    }

    #[test]
    fn test_from_json() {
        let value = json!({
            "needsPlanRevision": true,
            "needsResearch": true,
            "researchQueries": ["axum middleware"],
            "insights": ["auth layer missing"],
            "recommendation": "add an auth step",
            "confidence": 80
        });
        let r = Reflection::from_json(TaskId::new("t"), None, &value).unwrap();
        assert!(r.needs_plan_revision);
        assert!(r.needs_research);
        assert_eq!(r.research_queries, vec!["axum middleware"]);
        assert!((r.confidence - 0.8).abs() < 1e-9);
        assert!(r.revision_insights().contains("auth layer missing"));
    }

    #[test]
    fn test_from_json_research_without_queries_is_dropped() {
        let r = Reflection::from_json(TaskId::new("t"), None, &json!({"needsResearch": "yes"}))
            .unwrap();
        assert!(!r.needs_research);
    }

    #[test]
    fn test_from_json_rejects_unrelated_value() {
        assert!(Reflection::from_json(TaskId::new("t"), None, &json!({"rawText": "x"})).is_none());
    }

    #[test]
    fn test_final_report() {
        let report = FinalReport::from_json(&json!({
            "summary": "Built the API",
            "accomplishments": ["routes"],
            "futureImprovements": ["caching"]
        }))
        .unwrap();
        let md = report.to_markdown();
        assert!(md.contains("## Accomplishments\n- routes"));
        assert!(md.contains("## Future improvements\n- caching"));

        let ack = FinalReport::acknowledgment("Build API", 2, 3);
        assert!(ack.degraded);
        assert!(ack.summary.contains("2 of 3"));
    }
}
