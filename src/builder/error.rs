//! Configuration errors for hierarchy declarations.
//!
//! These are structural bugs in how a state machine was declared, not
//! runtime events. They are never retried.

use thiserror::Error;

/// A single structural defect found while validating a hierarchy.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HierarchyViolation {
    #[error("No root state declared")]
    MissingRoot,

    #[error("Multiple root states declared: {}", .states.join(", "))]
    MultipleRoots { states: Vec<String> },

    #[error("State '{state}' is declared more than once")]
    DuplicateState { state: String },

    #[error("Root state '{state}' must not declare a parent")]
    RootWithParent { state: String },

    #[error("State '{state}' must declare a parent")]
    MissingParent { state: String },

    #[error("Parent '{parent}' of state '{state}' is not declared")]
    UnknownParent { state: String, parent: String },

    #[error("Parent '{parent}' of state '{state}' is a {role} state and cannot have substates")]
    LeafParent {
        state: String,
        parent: String,
        role: String,
    },

    #[error("State '{state}' must declare a default substate to handle default entry")]
    MissingDefault { state: String },

    #[error("Leaf state '{state}' must not declare a default substate")]
    UnexpectedDefault { state: String },

    #[error("Default substate '{default}' of state '{state}' is not declared")]
    UnknownDefault { state: String, default: String },

    #[error("Default substate '{default}' of state '{state}' is not one of its substates")]
    DefaultOutsideSubtree { state: String, default: String },

    #[error("Parent chain of state '{state}' is cyclic")]
    Cycle { state: String },
}

/// Errors raised for invalid machine configuration.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid state hierarchy: {}", describe(.0))]
    InvalidHierarchy(Vec<HierarchyViolation>),

    #[error("State '{0}' is not declared in the hierarchy")]
    UnknownState(String),

    #[error("State '{state}' is a {role} state and cannot be the current state")]
    NotActivatable { state: String, role: String },

    #[error("Default entry from '{state}' did not reach a leaf within {limit} steps")]
    DefaultEntryTooDeep { state: String, limit: usize },
}

fn describe(violations: &[HierarchyViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
