//! State machine bound to an entity type.
//!
//! A [`Machine`] pairs a validated [`Hierarchy`] with the hooks declared
//! for each state. It is immutable once built and can be shared between
//! threads; all per-dispatch data lives in the entity and the event.

use super::event::StateEvent;
use super::transition::{Target, Transition};
use crate::builder::{ConfigError, HierarchyViolation};
use crate::coordinator::DispatchError;
use crate::core::{Hierarchy, StateKind};
use crate::entity::Entity;
use std::collections::HashMap;
use tracing::debug;

/// What a hook sees while it runs.
pub struct Context<'a, En: Entity, Ev> {
    state: En::Kind,
    entity: &'a mut En,
    event: &'a mut StateEvent<En, Ev>,
}

impl<'a, En: Entity, Ev> Context<'a, En, Ev> {
    fn new(state: En::Kind, entity: &'a mut En, event: &'a mut StateEvent<En, Ev>) -> Self {
        Self {
            state,
            entity,
            event,
        }
    }

    /// The state whose hook is running.
    pub fn state(&self) -> En::Kind {
        self.state
    }

    pub fn entity(&self) -> &En {
        &*self.entity
    }

    pub fn entity_mut(&mut self) -> &mut En {
        &mut *self.entity
    }

    pub fn event(&self) -> &StateEvent<En, Ev> {
        &*self.event
    }

    pub fn payload(&self) -> &Ev {
        self.event.payload()
    }

    /// Queue work to run after the transition commits.
    pub fn defer_side_effect<F>(&mut self, effect: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.event.defer_side_effect(effect);
    }
}

/// Entry or exit hook.
pub type Hook<En, Ev> =
    Box<dyn Fn(&mut Context<'_, En, Ev>) -> Result<(), DispatchError> + Send + Sync>;

/// Handler that may consume an event without leaving the current state.
pub type InternalHandler<En, Ev> =
    Box<dyn Fn(&mut Context<'_, En, Ev>) -> Result<bool, DispatchError> + Send + Sync>;

/// Handler that may answer an event with a transition target.
pub type Handler<En, Ev, K> =
    Box<dyn Fn(&mut Context<'_, En, Ev>) -> Result<Option<Target<K>>, DispatchError> + Send + Sync>;

/// Hooks declared for one state; missing hooks do nothing.
pub struct Hooks<En: Entity, Ev> {
    pub(crate) entry: Option<Hook<En, Ev>>,
    pub(crate) exit: Option<Hook<En, Ev>>,
    pub(crate) internal: Option<InternalHandler<En, Ev>>,
    pub(crate) handle: Option<Handler<En, Ev, En::Kind>>,
}

impl<En: Entity, Ev> Default for Hooks<En, Ev> {
    fn default() -> Self {
        Self {
            entry: None,
            exit: None,
            internal: None,
            handle: None,
        }
    }
}

/// Hierarchical state machine for entities of type `En` receiving event
/// payloads of type `Ev`.
pub struct Machine<En: Entity, Ev> {
    hierarchy: Hierarchy<En::Kind>,
    hooks: HashMap<En::Kind, Hooks<En, Ev>>,
}

impl<En: Entity, Ev> Machine<En, Ev> {
    pub(crate) fn new(hierarchy: Hierarchy<En::Kind>, hooks: HashMap<En::Kind, Hooks<En, Ev>>) -> Self {
        Self { hierarchy, hooks }
    }

    pub fn hierarchy(&self) -> &Hierarchy<En::Kind> {
        &self.hierarchy
    }

    pub(crate) fn run_entry(
        &self,
        state: En::Kind,
        entity: &mut En,
        event: &mut StateEvent<En, Ev>,
    ) -> Result<(), DispatchError> {
        debug!(event = %event.id(), state = state.name(), "entry");
        if let Some(hook) = self.hooks.get(&state).and_then(|h| h.entry.as_ref()) {
            hook(&mut Context::new(state, entity, event))?;
        }
        event.entered.push(state);
        Ok(())
    }

    pub(crate) fn run_exit(
        &self,
        state: En::Kind,
        entity: &mut En,
        event: &mut StateEvent<En, Ev>,
    ) -> Result<(), DispatchError> {
        debug!(event = %event.id(), state = state.name(), "exit");
        if let Some(hook) = self.hooks.get(&state).and_then(|h| h.exit.as_ref()) {
            hook(&mut Context::new(state, entity, event))?;
        }
        event.exited.push(state);
        Ok(())
    }

    pub(crate) fn handle_internal(
        &self,
        state: En::Kind,
        entity: &mut En,
        event: &mut StateEvent<En, Ev>,
    ) -> Result<bool, DispatchError> {
        match self.hooks.get(&state).and_then(|h| h.internal.as_ref()) {
            Some(handler) => handler(&mut Context::new(state, entity, event)),
            None => Ok(false),
        }
    }

    pub(crate) fn handle(
        &self,
        state: En::Kind,
        entity: &mut En,
        event: &mut StateEvent<En, Ev>,
    ) -> Result<Option<Target<En::Kind>>, DispatchError> {
        match self.hooks.get(&state).and_then(|h| h.handle.as_ref()) {
            Some(handler) => handler(&mut Context::new(state, entity, event)),
            None => Ok(None),
        }
    }

    /// Walk default substates from `state` until a leaf is entered.
    ///
    /// Each step is a nested transition into the declared default. The
    /// walk is bounded by the hierarchy's depth.
    pub(crate) fn default_entry(
        &self,
        state: En::Kind,
        entity: &mut En,
        event: &mut StateEvent<En, Ev>,
    ) -> Result<En::Kind, DispatchError> {
        let limit = self.hierarchy.max_depth();
        let mut current = state;
        for _ in 0..=limit {
            if self.hierarchy.role(current)?.is_leaf() {
                return Ok(current);
            }
            let default = self
                .hierarchy
                .default_substate(current)?
                .ok_or_else(|| {
                    ConfigError::InvalidHierarchy(vec![HierarchyViolation::MissingDefault {
                        state: current.name().to_string(),
                    }])
                })?;
            debug!(event = %event.id(), state = current.name(), default = default.name(), "default entry");
            current = Transition::between(&self.hierarchy, current, default)?.apply(self, entity, event)?;
        }
        Err(ConfigError::DefaultEntryTooDeep {
            state: state.name().to_string(),
            limit,
        }
        .into())
    }
}
