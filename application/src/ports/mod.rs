//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters must implement.

pub mod browser;
pub mod collaborator_error;
pub mod completion_backend;
pub mod computer;
pub mod file_system;
pub mod lifecycle;
pub mod memory_persistence;
pub mod vector_index;
