//! `unblock_plan` handler: asks for per-step remediation of a stalled plan.
//!
//! The parsed [`UnblockProposal`] travels in the result payload under
//! `proposal`; the planner applies it on the next cycle. An unparseable
//! answer is still a successful action with `"proposal": null`, leaving the
//! escape valve to guarantee progress.

use super::{ActionHandler, ExecutionContext, HandlerError, HandlerOutput};
use async_trait::async_trait;
use serde_json::{Value, json};
use taskpilot_domain::structured::extract_from_response;
use taskpilot_domain::{Action, ActionPayload, CompletionOptions, PromptTemplate, UnblockProposal};
use tracing::{debug, info};

pub struct UnblockHandler;

impl UnblockHandler {
    /// Read the proposal back out of a result payload.
    pub fn proposal_from_payload(payload: &Value) -> Option<UnblockProposal> {
        payload
            .get("proposal")
            .filter(|p| !p.is_null())
            .and_then(|p| serde_json::from_value(p.clone()).ok())
    }
}

#[async_trait]
impl ActionHandler for UnblockHandler {
    async fn handle(
        &self,
        action: &Action,
        context: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let ActionPayload::Unblock(request) = &action.payload else {
            return Err(HandlerError::invalid_payload(action, "unblock request"));
        };

        let options = CompletionOptions::default().with_system(PromptTemplate::unblock_system());
        let response = context
            .completion
            .complete_structured(&PromptTemplate::unblock_plan(request), &options)
            .await?;

        let proposal = extract_from_response(&response)
            .ok()
            .and_then(|json| UnblockProposal::from_json(&json));
        match &proposal {
            Some(p) => info!(
                action_id = %action.id,
                attempt = request.attempt,
                remediations = p.remediations.len(),
                "Unblock proposal received"
            ),
            None => debug!(action_id = %action.id, "No usable unblock proposal"),
        }

        Ok(HandlerOutput::new(json!({
            "attempt": request.attempt,
            "blocked": request.blocked.iter().map(|b| b.step_id.as_str()).collect::<Vec<_>>(),
            "proposal": proposal,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::completion::tests::ScriptedBackend;
    use crate::services::executor::tests::context;
    use taskpilot_domain::{BlockedStep, RemediationKind, StepId, TaskId, UnblockRequest};

    fn unblock_action() -> Action {
        Action::unblock(
            TaskId::new("t"),
            "unblock",
            UnblockRequest {
                plan_context: "Plan".into(),
                blocked: vec![BlockedStep {
                    step_id: StepId::new("a"),
                    title: "A".into(),
                    description: "A".into(),
                    missing_dependencies: vec![StepId::new("b")],
                }],
                attempt: 2,
            },
        )
    }

    #[tokio::test]
    async fn test_proposal_round_trips_through_payload() {
        let ctx = context(ScriptedBackend::texts(&[
            r#"```json
{"analysis": "cycle", "remediations": [{"stepId": "a", "action": "skip"}]}
```"#,
        ]));
        let output = UnblockHandler.handle(&unblock_action(), &ctx).await.unwrap();
        let proposal = UnblockHandler::proposal_from_payload(&output.payload).unwrap();
        assert_eq!(proposal.remediations[0].kind, RemediationKind::Skip);
        assert_eq!(output.payload["attempt"], 2);
    }

    #[tokio::test]
    async fn test_unusable_answer_is_success_without_proposal() {
        let ctx = context(ScriptedBackend::texts(&["The steps look fine to me."]));
        let output = UnblockHandler.handle(&unblock_action(), &ctx).await.unwrap();
        assert!(output.payload["proposal"].is_null());
        assert!(UnblockHandler::proposal_from_payload(&output.payload).is_none());
    }
}
