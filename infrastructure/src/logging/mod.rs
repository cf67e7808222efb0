//! Logging infrastructure — machine-readable lifecycle event log.
//!
//! Provides [`JsonlEventLog`], a JSONL file writer that implements the
//! [`LifecycleNotifier`](taskpilot_application::LifecycleNotifier) port.

mod jsonl_event_log;

pub use jsonl_event_log::JsonlEventLog;
