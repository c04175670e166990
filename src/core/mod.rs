//! Core hierarchy model.
//!
//! This module contains the static, pure part of the engine:
//! - State kinds via the `StateKind` trait and their structural `Role`
//! - The validated `Hierarchy` table and branch (ancestry) computation
//! - Records of committed transitions
//!
//! Nothing here touches an entity or runs a hook.

mod hierarchy;
mod record;
mod state;

pub use hierarchy::{Declaration, Hierarchy};
pub use record::TransitionRecord;
pub use state::{Role, State, StateKind};
