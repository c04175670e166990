//! Statehold: hierarchical state machines bound to persistent entities
//!
//! A machine is a static tree of states declared once and validated
//! eagerly. The entity it drives never stores "the state" separately: it
//! derives its current state from its own persisted attributes, and every
//! event is processed inside a transaction that locks the entity's row,
//! reloads it, runs the transition, and verifies the result before
//! committing. Side effects run only after a verified commit.
//!
//! # Core Concepts
//!
//! - **Hierarchy**: root, composite, simple and final states with parent
//!   links and default substates
//! - **Dispatch**: events bubble from the current leaf to the root,
//!   internal handlers first
//! - **Transitions**: exit hooks, then the event's actions, then entry
//!   hooks, pivoting on a common ancestor
//! - **Coordination**: lock, reload, dispatch, verify, commit, side effects
//!
//! # Example
//!
//! ```rust
//! use statehold::builder::{MachineBuilder, StateBuilder};
//! use statehold::effects::{Context, StateEvent, Target};
//! use statehold::entity::{Attributes, Entity, MemoryStore, Record};
//! use statehold::{state_kinds, DispatchError};
//! use serde::{Deserialize, Serialize};
//!
//! state_kinds! {
//!     enum Ticket { Root, Todo, Done }
//! }
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Row { state: Option<Ticket> }
//!
//! impl Attributes for Row {
//!     type Kind = Ticket;
//!     fn state(&self) -> Result<Ticket, String> {
//!         self.state.ok_or_else(|| "not opened".to_string())
//!     }
//! }
//!
//! enum Step { Open, Finish }
//!
//! type Declare = StateBuilder<Record<Row>, Step>;
//!
//! fn persist(cx: &mut Context<'_, Record<Row>, Step>) -> Result<(), DispatchError> {
//!     let state = cx.state();
//!     cx.entity_mut().attributes_mut().state = Some(state);
//!     cx.entity_mut().save()?;
//!     Ok(())
//! }
//!
//! let machine = MachineBuilder::new()
//!     .state(Declare::root(Ticket::Root).default_substate(Ticket::Todo))
//!     .state(
//!         Declare::simple(Ticket::Todo)
//!             .parent(Ticket::Root)
//!             .on_entry(persist)
//!             .handle(|cx| {
//!                 Ok(match cx.payload() {
//!                     Step::Finish => Some(Target::to(Ticket::Done)),
//!                     Step::Open => None,
//!                 })
//!             }),
//!     )
//!     .state(Declare::final_state(Ticket::Done).parent(Ticket::Root).on_entry(persist))
//!     .build()?;
//!
//! let store = MemoryStore::new();
//! let mut ticket = store.create(Row { state: None })?;
//! machine.initialize(&mut ticket, StateEvent::new(Step::Open))?;
//!
//! let state = machine.dispatch_or_fail(&mut ticket, StateEvent::new(Step::Finish))?;
//! assert_eq!(state.kind(), Ticket::Done);
//! assert_eq!(ticket.current_state()?, Ticket::Done);
//!
//! // Final states reject everything.
//! assert_eq!(machine.dispatch(&mut ticket, StateEvent::new(Step::Finish))?, None);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod builder;
pub mod coordinator;
pub mod core;
pub mod effects;
pub mod entity;

// Re-export commonly used types
pub use builder::{ConfigError, MachineBuilder, StateBuilder};
pub use coordinator::{DispatchError, DispatchOutcome};
pub use self::core::{Role, State, StateKind, TransitionRecord};
pub use effects::{Machine, StateEvent, Target};
pub use entity::{Entity, LockMode, StoreError};
