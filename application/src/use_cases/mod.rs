//! Use cases
//!
//! - [`run_task`] — the per-task agent loop
//! - [`orchestrator`] — concurrent runs, status, stop and idle cleanup

pub mod orchestrator;
pub mod run_task;
