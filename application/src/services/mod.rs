//! Services of the agent loop.
//!
//! Each service is a plain struct over its ports; the loop in
//! [`crate::use_cases::run_task`] drives them one cycle at a time.

pub mod completion;
pub mod executor;
pub mod memory;
pub mod perception;
pub mod planner;
pub mod reflector;
