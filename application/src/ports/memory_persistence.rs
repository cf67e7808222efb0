//! Durable mirror for the memory store.
//!
//! Every store operation is mirrored to a stable location keyed by collection
//! and entity id. Mirror failures are logged by the store, never propagated.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Persistence error: {0}")]
pub struct PersistenceError(pub String);

pub trait MemoryPersistence: Send + Sync {
    /// Write (or overwrite) one record.
    fn persist(&self, collection: &str, id: &str, value: &Value) -> Result<(), PersistenceError>;
}
