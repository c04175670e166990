//! The machine and everything that runs while an event is processed.
//!
//! This is the imperative shell around [`crate::core`]: hooks run here,
//! entities are mutated here, and queued actions and side effects are
//! drained here.
//!
//! # Key Concepts
//!
//! - **Machine**: a validated hierarchy plus the hooks of each state
//! - **Dispatch**: internal handlers first, then transitioning handlers,
//!   both bubbling from the leaf to the root
//! - **Transitions**: exit, then actions, then entry, pivoting on a common
//!   ancestor, then default entry down to a leaf
//! - **Events**: payload plus FIFO queues of actions and side effects,
//!   each drained exactly once

mod dispatcher;
mod event;
mod machine;
mod transition;

pub use dispatcher::Resolution;
pub use event::{Action, Queue, SideEffect, StateEvent};
pub use machine::{Context, Handler, Hook, Hooks, InternalHandler, Machine};
pub use transition::{Target, Transition};
