//! Application-level configuration.
//!
//! - [`AgentConfig`] — agent loop control (iterations, failure credits, unblocking, research)
//! - [`RetryPolicy`] — completion retry/backoff and per-request timeout
//! - [`PerceptionConfig`] — relevant-code selection limits
//! - [`OrchestratorConfig`] — idle-run sweeping

pub mod agent_params;
pub mod retry_policy;

pub use agent_params::{AgentConfig, ForcedProgressPolicy, OrchestratorConfig, PerceptionConfig};
pub use retry_policy::RetryPolicy;
