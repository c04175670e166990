//! Builder API for declaring state hierarchies.
//!
//! States are declared one at a time with [`StateBuilder`] and collected by
//! [`MachineBuilder`], which validates the whole hierarchy at once and
//! reports every violation it finds.

pub mod error;
pub mod machine;
pub mod macros;
pub mod state;

pub use error::{ConfigError, HierarchyViolation};
pub use machine::MachineBuilder;
pub use state::StateBuilder;
