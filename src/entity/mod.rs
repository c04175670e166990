//! The persistent entity a state machine is bound to.
//!
//! The engine never stores state itself. It asks the entity for its current
//! state, which the entity derives from its own attributes, and relies on
//! the entity's storage for transactions and row locks.
//!
//! [`memory`] provides an in-memory implementation backed by encoded rows
//! and real row locks, suitable for tests and single-process use.

pub mod error;
pub mod memory;

pub use error::StoreError;
pub use memory::{Attributes, MemoryStore, Record, StoreConfig};

use crate::core::StateKind;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};

/// Lock taken on the entity's storage row while reading it.
///
/// Passed explicitly to every locking read; there is no ambient lock mode.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum LockMode {
    /// Plain read.
    #[default]
    None,
    /// Shared lock, held until the enclosing transaction ends.
    Shared,
    /// Exclusive lock, held until the enclosing transaction ends.
    ForUpdate,
}

/// Contract between the engine and a persistent entity.
///
/// # Requirements
///
/// - `current_state` must be a pure function of the entity's attributes.
/// - `refresh` must discard every in-memory attribute and derived value.
/// - `transaction` must roll back every write made inside `body` when
///   `body` fails, and hold any lock taken inside it until it ends.
pub trait Entity {
    /// Kind of state this entity can be in.
    type Kind: StateKind;

    /// Storage identity (e.g. a primary key).
    type Id: Clone + PartialEq + Debug + Display + Send + Sync;

    fn id(&self) -> Self::Id;

    /// Derive the current state from the attributes held in memory.
    fn current_state(&self) -> Result<Self::Kind, StoreError>;

    /// Reload attributes from storage, taking `lock` on the row.
    fn refresh(&mut self, lock: LockMode) -> Result<(), StoreError>;

    /// Whether in-memory attributes differ from the last persisted snapshot.
    fn is_dirty(&self) -> bool;

    /// Run `body` inside a storage transaction.
    ///
    /// Commits when `body` succeeds; rolls back and returns its error
    /// otherwise.
    fn transaction<T, E, F>(&mut self, body: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StoreError>;

    /// Run `body` in a transaction after refreshing under an exclusive lock.
    fn transaction_with_exclusive_lock<T, E, F>(&mut self, body: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.transaction(|entity| {
            entity.refresh(LockMode::ForUpdate)?;
            body(entity)
        })
    }

    /// Identity comparison used for state equality.
    fn identity_equals(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
