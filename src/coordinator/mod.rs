//! Transactional entry points for dispatching events to an entity.
//!
//! Every dispatch follows the same protocol:
//!
//! 1. Reject the entity if it carries unsaved changes. No lock is taken.
//! 2. Open a transaction, lock the entity's row exclusively and reload it.
//! 3. Dispatch against the freshly derived state and run remaining actions.
//! 4. Reload the entity and check that its derived state is the one the
//!    dispatch settled on.
//! 5. Commit, then run the event's side effects outside the lock.
//!
//! Any failure rolls the transaction back and reloads the entity so the
//! caller sees what is actually persisted. Side effects never run after a
//! failure.

pub mod error;

pub use error::DispatchError;

use crate::core::{State, StateKind, TransitionRecord};
use crate::effects::{Machine, Resolution, StateEvent};
use crate::entity::{Entity, LockMode};
use chrono::Utc;
use tracing::{info, warn};

/// Result of a coordinated dispatch.
#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome<K: StateKind, I> {
    /// The entity moved to `state`; `record` describes how.
    Transitioned {
        state: State<K, I>,
        record: TransitionRecord<K>,
    },
    /// An internal handler consumed the event; the entity stayed put.
    Handled(State<K, I>),
    /// No handler claimed the event dispatched to the given leaf.
    NoHandler { dispatched_to: K },
}

impl<K: StateKind, I> DispatchOutcome<K, I> {
    /// The entity's state after dispatch, unless nothing handled the event.
    pub fn state(&self) -> Option<&State<K, I>> {
        match self {
            Self::Transitioned { state, .. } | Self::Handled(state) => Some(state),
            Self::NoHandler { .. } => None,
        }
    }

    pub fn record(&self) -> Option<&TransitionRecord<K>> {
        match self {
            Self::Transitioned { record, .. } => Some(record),
            _ => None,
        }
    }

    pub fn into_state(self) -> Option<State<K, I>> {
        match self {
            Self::Transitioned { state, .. } | Self::Handled(state) => Some(state),
            Self::NoHandler { .. } => None,
        }
    }
}

/// Where a coordinated body left the entity.
struct Settled<K> {
    from: Option<K>,
    to: K,
    transitioned: bool,
}

impl<En: Entity, Ev> Machine<En, Ev> {
    /// Dispatch `event` to `entity`'s current state.
    ///
    /// An event nobody handles is reported as
    /// [`DispatchOutcome::NoHandler`] after the transaction has been
    /// rolled back; every other failure is returned as an error.
    pub fn send(
        &self,
        entity: &mut En,
        mut event: StateEvent<En, Ev>,
    ) -> Result<DispatchOutcome<En::Kind, En::Id>, DispatchError> {
        let result = self.coordinate(entity, &mut event, |machine, entity, event| {
            let from = entity.current_state()?;
            match machine.dispatch_to(from, entity, event)? {
                Resolution::Internal(state) => Ok(Settled {
                    from: Some(from),
                    to: state,
                    transitioned: false,
                }),
                Resolution::Transitioned(state) => Ok(Settled {
                    from: Some(from),
                    to: state,
                    transitioned: true,
                }),
                Resolution::Unhandled(state) => Err(DispatchError::UnhandledEvent {
                    state: state.name().to_string(),
                }),
            }
        });

        match result {
            Ok(settled) => Ok(outcome(entity, &mut event, settled)),
            Err(error) if error.is_unhandled() => match event.dispatched_to() {
                Some(dispatched_to) => Ok(DispatchOutcome::NoHandler { dispatched_to }),
                None => Err(error),
            },
            Err(error) => Err(error),
        }
    }

    /// Dispatch `event`, treating an unhandled event as `Ok(None)`.
    pub fn dispatch(
        &self,
        entity: &mut En,
        event: StateEvent<En, Ev>,
    ) -> Result<Option<State<En::Kind, En::Id>>, DispatchError> {
        Ok(self.send(entity, event)?.into_state())
    }

    /// Dispatch `event`, failing with [`DispatchError::UnhandledEvent`] if
    /// no handler claims it.
    pub fn dispatch_or_fail(
        &self,
        entity: &mut En,
        event: StateEvent<En, Ev>,
    ) -> Result<State<En::Kind, En::Id>, DispatchError> {
        match self.send(entity, event)? {
            DispatchOutcome::Transitioned { state, .. } | DispatchOutcome::Handled(state) => {
                Ok(state)
            }
            DispatchOutcome::NoHandler { dispatched_to } => Err(DispatchError::UnhandledEvent {
                state: dispatched_to.name().to_string(),
            }),
        }
    }

    /// Run the initial transition of a newly created entity: default entry
    /// from the root down to a leaf.
    ///
    /// The returned outcome is always [`DispatchOutcome::Transitioned`],
    /// with a record whose `from` is `None`. An entity that already
    /// derives a state is rejected with
    /// [`DispatchError::AlreadyInitialized`] and left untouched.
    pub fn initialize(
        &self,
        entity: &mut En,
        mut event: StateEvent<En, Ev>,
    ) -> Result<DispatchOutcome<En::Kind, En::Id>, DispatchError> {
        let settled = self.coordinate(entity, &mut event, |machine, entity, event| {
            if let Ok(state) = entity.current_state() {
                return Err(DispatchError::AlreadyInitialized {
                    entity: entity.id().to_string(),
                    state: state.name().to_string(),
                });
            }
            let leaf = machine.default_entry(machine.hierarchy().root(), entity, event)?;
            Ok(Settled {
                from: None,
                to: leaf,
                transitioned: true,
            })
        })?;
        Ok(outcome(entity, &mut event, settled))
    }

    fn coordinate<F>(
        &self,
        entity: &mut En,
        event: &mut StateEvent<En, Ev>,
        body: F,
    ) -> Result<Settled<En::Kind>, DispatchError>
    where
        F: FnOnce(&Self, &mut En, &mut StateEvent<En, Ev>) -> Result<Settled<En::Kind>, DispatchError>,
    {
        if entity.is_dirty() {
            return Err(DispatchError::DirtyEntity {
                entity: entity.id().to_string(),
                event: event.id(),
            });
        }

        let result = entity.transaction_with_exclusive_lock(|entity| {
            let settled = body(self, entity, event)?;
            event.process_actions(entity)?;
            verify(entity, event, settled.to)?;
            Ok(settled)
        });

        match result {
            Ok(settled) => {
                let effects = event.process_side_effects();
                info!(
                    event = %event.id(),
                    entity = %entity.id(),
                    from = settled.from.as_ref().map(|state| state.name()),
                    to = settled.to.name(),
                    side_effects = effects,
                    "committed"
                );
                Ok(settled)
            }
            Err(error) => {
                warn!(event = %event.id(), entity = %entity.id(), %error, "rolled back");
                if let Err(reload) = entity.refresh(LockMode::None) {
                    warn!(event = %event.id(), entity = %entity.id(), error = %reload, "reload after rollback failed");
                }
                Err(error)
            }
        }
    }
}

/// Reload `entity` and check that it derives the expected state.
fn verify<En: Entity, Ev>(
    entity: &mut En,
    event: &StateEvent<En, Ev>,
    expected: En::Kind,
) -> Result<(), DispatchError> {
    entity.refresh(LockMode::None)?;
    let actual = entity.current_state()?;
    if !State::new(actual, entity.id()).is(&State::new(expected, entity.id())) {
        return Err(DispatchError::UnexpectedState {
            expected: expected.name().to_string(),
            actual: actual.name().to_string(),
            event: event.id(),
        });
    }
    Ok(())
}

fn outcome<En: Entity, Ev>(
    entity: &En,
    event: &mut StateEvent<En, Ev>,
    settled: Settled<En::Kind>,
) -> DispatchOutcome<En::Kind, En::Id> {
    let state = State::new(settled.to, entity.id());
    if !settled.transitioned {
        return DispatchOutcome::Handled(state);
    }
    DispatchOutcome::Transitioned {
        state,
        record: TransitionRecord {
            event: event.id(),
            from: settled.from,
            to: settled.to,
            exited: std::mem::take(&mut event.exited),
            entered: std::mem::take(&mut event.entered),
            committed_at: Utc::now(),
        },
    }
}
