//! Builder for declaring one state and its hooks.

use crate::coordinator::DispatchError;
use crate::core::{Declaration, Role};
use crate::effects::{Context, Hooks, Target};
use crate::entity::Entity;

/// Builder for declaring a state with a fluent API.
///
/// The constructor fixes the state's role; parent and default substate
/// are checked when the machine is built, not here.
pub struct StateBuilder<En: Entity, Ev> {
    kind: En::Kind,
    role: Role,
    parent: Option<En::Kind>,
    default_substate: Option<En::Kind>,
    hooks: Hooks<En, Ev>,
}

impl<En: Entity, Ev> StateBuilder<En, Ev> {
    fn new(kind: En::Kind, role: Role) -> Self {
        Self {
            kind,
            role,
            parent: None,
            default_substate: None,
            hooks: Hooks::default(),
        }
    }

    /// Declare the root state. Requires a default substate.
    pub fn root(kind: En::Kind) -> Self {
        Self::new(kind, Role::Root)
    }

    /// Declare a composite state. Requires a parent and a default substate.
    pub fn composite(kind: En::Kind) -> Self {
        Self::new(kind, Role::Composite)
    }

    /// Declare a leaf state. Requires a parent.
    pub fn simple(kind: En::Kind) -> Self {
        Self::new(kind, Role::Simple)
    }

    /// Declare a leaf state that rejects every event. Requires a parent.
    ///
    /// Handlers declared on a final state never run.
    pub fn final_state(kind: En::Kind) -> Self {
        Self::new(kind, Role::Final)
    }

    /// Set the parent state.
    pub fn parent(mut self, parent: En::Kind) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set the substate entered when a transition targets this state.
    pub fn default_substate(mut self, default: En::Kind) -> Self {
        self.default_substate = Some(default);
        self
    }

    /// Run `hook` whenever this state is entered.
    pub fn on_entry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Context<'_, En, Ev>) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        self.hooks.entry = Some(Box::new(hook));
        self
    }

    /// Run `hook` whenever this state is exited.
    pub fn on_exit<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Context<'_, En, Ev>) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        self.hooks.exit = Some(Box::new(hook));
        self
    }

    /// Handle events without leaving the current state.
    ///
    /// Returning `true` claims the event.
    pub fn handle_internal<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Context<'_, En, Ev>) -> Result<bool, DispatchError> + Send + Sync + 'static,
    {
        self.hooks.internal = Some(Box::new(handler));
        self
    }

    /// Handle events by transitioning.
    ///
    /// Returning `None` passes the event to the parent state.
    pub fn handle<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Context<'_, En, Ev>) -> Result<Option<Target<En::Kind>>, DispatchError>
            + Send
            + Sync
            + 'static,
    {
        self.hooks.handle = Some(Box::new(handler));
        self
    }

    pub(crate) fn into_parts(self) -> (Declaration<En::Kind>, Hooks<En, Ev>) {
        (
            Declaration {
                kind: self.kind,
                role: self.role,
                parent: self.parent,
                default_substate: self.default_substate,
            },
            self.hooks,
        )
    }
}
