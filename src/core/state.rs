//! State kinds and bound state values.
//!
//! A [`StateKind`] names a position in the hierarchy (the "class" of a
//! state). A [`State`] is a kind bound to one entity identity, which is
//! what dispatch returns and what post-transition verification compares.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::hash::Hash;

/// Trait for the kinds of state declared in a hierarchy.
///
/// Kinds are plain, copyable identifiers. Structure (parents, default
/// substates) lives in the [`Hierarchy`](crate::core::Hierarchy), not in
/// the kind itself.
///
/// # Example
///
/// ```rust
/// use statehold::core::StateKind;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
/// enum OrderState {
///     Root,
///     Open,
///     New,
///     Paid,
/// }
///
/// impl StateKind for OrderState {
///     fn name(&self) -> &str {
///         match self {
///             Self::Root => "Root",
///             Self::Open => "Open",
///             Self::New => "New",
///             Self::Paid => "Paid",
///         }
///     }
/// }
///
/// assert_eq!(OrderState::Paid.name(), "Paid");
/// ```
pub trait StateKind:
    Copy + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Get the kind's name for display/logging.
    fn name(&self) -> &str;
}

/// The structural role a kind plays in the hierarchy.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Role {
    /// Top of the hierarchy. Has a default substate, never current.
    Root,
    /// Non-leaf with a parent and a default substate, never current.
    Composite,
    /// Leaf state an entity can actually be in.
    Simple,
    /// Leaf state rejecting every event.
    Final,
}

impl Role {
    /// Whether a state of this role may be the entity's current state.
    pub fn is_leaf(self) -> bool {
        matches!(self, Self::Simple | Self::Final)
    }

    /// Whether a state of this role may be a parent of other states.
    pub fn can_have_substates(self) -> bool {
        matches!(self, Self::Root | Self::Composite)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Root => "root",
            Self::Composite => "composite",
            Self::Simple => "simple",
            Self::Final => "final",
        };
        f.write_str(label)
    }
}

/// A state kind bound to one entity identity.
///
/// Two states are equal iff they have the same kind and belong to the
/// same entity (by identity, not by in-memory instance).
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct State<K, I> {
    kind: K,
    entity: I,
}

impl<K: StateKind, I: Clone + PartialEq> State<K, I> {
    pub fn new(kind: K, entity: I) -> Self {
        Self { kind, entity }
    }

    pub fn kind(&self) -> K {
        self.kind
    }

    pub fn entity(&self) -> &I {
        &self.entity
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }

    /// Identity comparison: same kind, same entity.
    pub fn is(&self, other: &Self) -> bool {
        self == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
    enum TestState {
        Root,
        Pending,
        Done,
    }

    impl StateKind for TestState {
        fn name(&self) -> &str {
            match self {
                Self::Root => "Root",
                Self::Pending => "Pending",
                Self::Done => "Done",
            }
        }
    }

    #[test]
    fn state_equality_uses_kind_and_entity_identity() {
        let a = State::new(TestState::Pending, 7u64);
        let b = State::new(TestState::Pending, 7u64);
        let other_entity = State::new(TestState::Pending, 8u64);
        let other_kind = State::new(TestState::Done, 7u64);

        assert!(a.is(&b));
        assert!(!a.is(&other_entity));
        assert!(!a.is(&other_kind));
    }

    #[test]
    fn roles_classify_leaves_and_parents() {
        assert!(Role::Simple.is_leaf());
        assert!(Role::Final.is_leaf());
        assert!(!Role::Composite.is_leaf());
        assert!(Role::Root.can_have_substates());
        assert!(Role::Composite.can_have_substates());
        assert!(!Role::Final.can_have_substates());
    }

    #[test]
    fn state_exposes_kind_name() {
        let state = State::new(TestState::Root, "order-1".to_string());
        assert_eq!(state.name(), "Root");
        assert_eq!(state.entity(), "order-1");
    }

    #[test]
    fn state_serializes_correctly() {
        let state = State::new(TestState::Done, 3u32);
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: State<TestState, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}
