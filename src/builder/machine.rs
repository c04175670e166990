//! Builder for constructing machines.

use crate::builder::error::ConfigError;
use crate::builder::state::StateBuilder;
use crate::core::Hierarchy;
use crate::effects::Machine;
use crate::entity::Entity;
use std::collections::HashMap;

/// Builder for constructing a machine from state declarations.
pub struct MachineBuilder<En: Entity, Ev> {
    states: Vec<StateBuilder<En, Ev>>,
}

impl<En: Entity, Ev> MachineBuilder<En, Ev> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self { states: Vec::new() }
    }

    /// Add a state declaration.
    pub fn state(mut self, state: StateBuilder<En, Ev>) -> Self {
        self.states.push(state);
        self
    }

    /// Add multiple state declarations at once.
    pub fn states(mut self, states: Vec<StateBuilder<En, Ev>>) -> Self {
        self.states.extend(states);
        self
    }

    /// Build the machine.
    /// Returns every structural violation found if the hierarchy is invalid.
    pub fn build(self) -> Result<Machine<En, Ev>, ConfigError> {
        let mut declarations = Vec::with_capacity(self.states.len());
        let mut hooks = HashMap::with_capacity(self.states.len());
        for state in self.states {
            let (declaration, state_hooks) = state.into_parts();
            hooks.insert(declaration.kind, state_hooks);
            declarations.push(declaration);
        }

        let hierarchy = Hierarchy::new(declarations)?;
        Ok(Machine::new(hierarchy, hooks))
    }
}

impl<En: Entity, Ev> Default for MachineBuilder<En, Ev> {
    fn default() -> Self {
        Self::new()
    }
}
