//! Errors raised while dispatching events.

use crate::builder::ConfigError;
use crate::entity::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Failure of a dispatch, an initial transition, or one of its hooks.
///
/// Every variant aborts the enclosing transaction. None is retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Event could not be handled by state '{state}'")]
    UnhandledEvent { state: String },

    #[error("Invalid transition from '{from}' to '{to}'{}: {reason}", via_suffix(.via))]
    InvalidTransition {
        from: String,
        to: String,
        via: Option<String>,
        reason: String,
    },

    #[error("Expected state '{expected}' after event {event}, found '{actual}'")]
    UnexpectedState {
        expected: String,
        actual: String,
        event: Uuid,
    },

    #[error("Entity '{entity}' has unsaved changes; refusing to dispatch event {event}")]
    DirtyEntity { entity: String, event: Uuid },

    #[error("Entity '{entity}' is already in state '{state}'")]
    AlreadyInitialized { entity: String, state: String },

    #[error("Transition aborted: {0}")]
    Aborted(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl DispatchError {
    /// Veto the running transition from a hook, handler, or action.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted(reason.into())
    }

    pub fn is_unhandled(&self) -> bool {
        matches!(self, Self::UnhandledEvent { .. })
    }
}

fn via_suffix(via: &Option<String>) -> String {
    via.as_ref()
        .map(|state| format!(" via '{state}'"))
        .unwrap_or_default()
}
