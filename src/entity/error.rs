//! Errors reported by entity storage.

use std::time::Duration;
use thiserror::Error;

/// Failures of the persistent entity collaborator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Entity '{0}' not found")]
    NotFound(String),

    #[error("Timed out after {waited:?} waiting for a lock on entity '{entity}'")]
    LockTimeout { entity: String, waited: Duration },

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Attributes of entity '{entity}' describe no valid state: {reason}")]
    InvalidState { entity: String, reason: String },
}
