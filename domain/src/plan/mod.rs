//! Plan domain module
//!
//! Plans are versioned step graphs. This module holds the entities, the
//! lenient parser for model-produced step lists and the unblock remediation
//! applied when no step is runnable.

pub mod entities;
pub mod parser;
pub mod unblock;

pub use entities::{
    Complexity, Plan, PlanProgress, PlanStatus, Step, StepStatus, StepType, normalize_steps,
};
pub use parser::{PlanHeader, parse_plan_header, parse_step_json, parse_steps};
pub use unblock::{Remediation, RemediationKind, UnblockProposal, carry_over};
