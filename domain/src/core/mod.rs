//! Core domain concepts shared across all subdomains.
//!
//! - [`ids`] — strongly typed identifiers for every persisted entity
//! - [`error::DomainError`] — domain-level errors
//! - [`string`] — truncation and keyword helpers used when building prompts

pub mod error;
pub mod ids;
pub mod string;
