//! Transition paths between states.
//!
//! A [`Transition`] pivots on a common ancestor (`via`): every state below
//! `via` on the source branch is exited leaf-first, then the event's
//! actions run, then every state below `via` on the destination branch is
//! entered ancestor-first. A destination that is not a leaf is then
//! default-entered until a leaf is reached.

use super::event::StateEvent;
use super::machine::Machine;
use crate::coordinator::DispatchError;
use crate::core::{Hierarchy, StateKind};
use crate::entity::Entity;
use serde::{Deserialize, Serialize};

/// Where a handler wants the entity to go.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Target<K: StateKind> {
    pub to: K,
    pub via: Option<K>,
}

impl<K: StateKind> Target<K> {
    /// Transition to `to` through the least common ancestor.
    pub fn to(to: K) -> Self {
        Self { to, via: None }
    }

    /// Pivot on an explicit ancestor instead of the least common one.
    pub fn via(mut self, via: K) -> Self {
        self.via = Some(via);
        self
    }
}

/// Computed path of a single transition.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition<K: StateKind> {
    pub from: K,
    pub to: K,
    pub via: K,
    exit: Vec<K>,
    enter: Vec<K>,
}

impl<K: StateKind> Transition<K> {
    /// Plan the path for a handler's target.
    pub fn plan(hierarchy: &Hierarchy<K>, from: K, target: Target<K>) -> Result<Self, DispatchError> {
        match target.via {
            Some(via) => Self::through(hierarchy, from, target.to, via),
            None => Self::between(hierarchy, from, target.to),
        }
    }

    /// Plan a transition pivoting on the least common ancestor.
    ///
    /// The ancestor must be able to have substates, so a leaf targeting
    /// itself exits and re-enters itself.
    pub fn between(hierarchy: &Hierarchy<K>, from: K, to: K) -> Result<Self, DispatchError> {
        let destination = hierarchy.branch(to)?;
        for candidate in hierarchy.branch(from)? {
            if destination.contains(&candidate) && hierarchy.role(candidate)?.can_have_substates() {
                return Self::through(hierarchy, from, to, candidate);
            }
        }
        Err(invalid(from, to, None, "states share no common ancestor"))
    }

    /// Plan a transition pivoting on `via`.
    pub fn through(hierarchy: &Hierarchy<K>, from: K, to: K, via: K) -> Result<Self, DispatchError> {
        if !hierarchy.role(via)?.can_have_substates() {
            return Err(invalid(
                from,
                to,
                Some(via),
                "via state is neither composite nor root",
            ));
        }

        if !hierarchy.is_within(from, via)? {
            return Err(invalid(from, to, Some(via), "source is not within via state"));
        }
        if !hierarchy.is_within(to, via)? {
            return Err(invalid(from, to, Some(via), "destination is not within via state"));
        }

        let exit = below(hierarchy.branch(from)?, via);
        let mut enter = below(hierarchy.branch(to)?, via);
        enter.reverse();

        Ok(Self {
            from,
            to,
            via,
            exit,
            enter,
        })
    }

    /// States to exit, leaf-first.
    pub fn exit(&self) -> &[K] {
        &self.exit
    }

    /// States to enter, ancestor-first.
    pub fn enter(&self) -> &[K] {
        &self.enter
    }

    /// Last state entered; `via` itself when nothing is entered.
    pub fn destination(&self) -> K {
        self.enter.last().copied().unwrap_or(self.via)
    }

    /// Run exit hooks, actions and entry hooks; then default-enter the
    /// destination until a leaf is reached.
    pub fn execute<En, Ev>(
        &self,
        machine: &Machine<En, Ev>,
        entity: &mut En,
        event: &mut StateEvent<En, Ev>,
    ) -> Result<K, DispatchError>
    where
        En: Entity<Kind = K>,
    {
        let destination = self.apply(machine, entity, event)?;
        machine.default_entry(destination, entity, event)
    }

    /// Run this transition's own hooks without settling on a leaf.
    pub(crate) fn apply<En, Ev>(
        &self,
        machine: &Machine<En, Ev>,
        entity: &mut En,
        event: &mut StateEvent<En, Ev>,
    ) -> Result<K, DispatchError>
    where
        En: Entity<Kind = K>,
    {
        for state in &self.exit {
            machine.run_exit(*state, entity, event)?;
        }
        event.process_actions(entity)?;
        for state in &self.enter {
            machine.run_entry(*state, entity, event)?;
        }
        Ok(self.destination())
    }
}

/// Prefix of `branch` strictly below `via`, or `None` if `via` is absent.
/// The part of `branch` strictly below `via`.
fn below<K: StateKind>(mut branch: Vec<K>, via: K) -> Vec<K> {
    if let Some(position) = branch.iter().position(|state| *state == via) {
        branch.truncate(position);
    }
    branch
}

fn invalid<K: StateKind>(from: K, to: K, via: Option<K>, reason: &str) -> DispatchError {
    DispatchError::InvalidTransition {
        from: from.name().to_string(),
        to: to.name().to_string(),
        via: via.map(|state| state.name().to_string()),
        reason: reason.to_string(),
    }
}
