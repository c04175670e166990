//! Event routing through the state hierarchy.
//!
//! Dispatch starts at the entity's current leaf state:
//!
//! 1. Internal handlers are asked leaf-to-root. The first one that claims
//!    the event ends dispatch; nothing is exited or entered.
//! 2. Otherwise transitioning handlers are asked leaf-to-root. A state
//!    that does not answer is exited before its parent is asked, so an
//!    ancestor's handler catches what its substates do not.
//! 3. An event that bubbles past the root is unhandled.
//!
//! Final states reject every event without asking any handler.

use super::event::StateEvent;
use super::machine::Machine;
use super::transition::Transition;
use crate::coordinator::DispatchError;
use crate::core::{Role, StateKind};
use crate::entity::Entity;
use tracing::debug;

/// How dispatch ended, before any verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution<K> {
    /// An internal handler claimed the event in the given leaf.
    Internal(K),
    /// A transition settled on the given leaf.
    Transitioned(K),
    /// No handler claimed the event dispatched to the given leaf.
    Unhandled(K),
}

impl<En: Entity, Ev> Machine<En, Ev> {
    /// Dispatch `event` to the leaf state `state`.
    pub fn dispatch_to(
        &self,
        state: En::Kind,
        entity: &mut En,
        event: &mut StateEvent<En, Ev>,
    ) -> Result<Resolution<En::Kind>, DispatchError> {
        let role = self.hierarchy().ensure_leaf(state)?;
        event.set_dispatched_to(state);

        if role == Role::Final {
            debug!(event = %event.id(), state = state.name(), "final state rejects event");
            return Ok(Resolution::Unhandled(state));
        }

        if self.dispatch_internal(state, entity, event)? {
            return Ok(Resolution::Internal(state));
        }

        self.dispatch_local(state, entity, event)
    }

    /// Ask internal handlers from `state` up to the root.
    pub(crate) fn dispatch_internal(
        &self,
        state: En::Kind,
        entity: &mut En,
        event: &mut StateEvent<En, Ev>,
    ) -> Result<bool, DispatchError> {
        for candidate in self.hierarchy().branch(state)? {
            if self.handle_internal(candidate, entity, event)? {
                debug!(event = %event.id(), state = candidate.name(), "handled internally");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Ask transitioning handlers from `state` up to the root, exiting
    /// each state that does not answer.
    pub(crate) fn dispatch_local(
        &self,
        state: En::Kind,
        entity: &mut En,
        event: &mut StateEvent<En, Ev>,
    ) -> Result<Resolution<En::Kind>, DispatchError> {
        let mut current = state;
        loop {
            if let Some(target) = self.handle(current, entity, event)? {
                debug!(
                    event = %event.id(),
                    state = current.name(),
                    to = target.to.name(),
                    "handler chose transition"
                );
                let transition = Transition::plan(self.hierarchy(), current, target)?;
                let leaf = transition.execute(self, entity, event)?;
                return Ok(Resolution::Transitioned(leaf));
            }
            match self.hierarchy().parent(current)? {
                Some(parent) => {
                    self.run_exit(current, entity, event)?;
                    current = parent;
                }
                None => return Ok(Resolution::Unhandled(state)),
            }
        }
    }
}
