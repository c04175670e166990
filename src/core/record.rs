//! Records of committed transitions.
//!
//! A record is produced only after the coordinator has verified the new
//! state and committed, so it describes what actually happened to the
//! entity, including exits run while the event bubbled and any default
//! entries that followed the explicit target.

use super::state::StateKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Record of one committed transition.
///
/// # Example
///
/// ```rust
/// use statehold::core::{StateKind, TransitionRecord};
/// use serde::{Deserialize, Serialize};
/// use chrono::Utc;
/// use uuid::Uuid;
///
/// #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
/// enum Phase { Root, One, Two }
///
/// impl StateKind for Phase {
///     fn name(&self) -> &str {
///         match self {
///             Self::Root => "Root",
///             Self::One => "One",
///             Self::Two => "Two",
///         }
///     }
/// }
///
/// let record = TransitionRecord {
///     event: Uuid::new_v4(),
///     from: Some(Phase::One),
///     to: Phase::Two,
///     exited: vec![Phase::One],
///     entered: vec![Phase::Two],
///     committed_at: Utc::now(),
/// };
///
/// assert_eq!(record.path(), vec![Phase::One, Phase::Two]);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct TransitionRecord<K: StateKind> {
    /// Identifier of the event that caused the transition
    pub event: Uuid,
    /// Leaf state before the transition; `None` for the initial transition
    pub from: Option<K>,
    /// Verified leaf state after the transition
    pub to: K,
    /// Every state exited, in the order exit hooks ran
    pub exited: Vec<K>,
    /// Every state entered, in the order entry hooks ran
    pub entered: Vec<K>,
    /// When the transition was committed
    pub committed_at: DateTime<Utc>,
}

impl<K: StateKind> TransitionRecord<K> {
    /// States traversed: the exits followed by the entries.
    pub fn path(&self) -> Vec<K> {
        self.exited
            .iter()
            .chain(self.entered.iter())
            .copied()
            .collect()
    }

    /// Whether the hook of `kind` ran on the way out or on the way in.
    pub fn touched(&self, kind: K) -> bool {
        self.exited.contains(&kind) || self.entered.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
    enum TestState {
        Root,
        Open,
        New,
        Paid,
    }

    impl StateKind for TestState {
        fn name(&self) -> &str {
            match self {
                Self::Root => "Root",
                Self::Open => "Open",
                Self::New => "New",
                Self::Paid => "Paid",
            }
        }
    }

    fn record() -> TransitionRecord<TestState> {
        TransitionRecord {
            event: Uuid::new_v4(),
            from: Some(TestState::New),
            to: TestState::Paid,
            exited: vec![TestState::New],
            entered: vec![TestState::Paid],
            committed_at: Utc::now(),
        }
    }

    #[test]
    fn touched_ignores_common_ancestors() {
        let record = record();

        assert!(record.touched(TestState::New));
        assert!(record.touched(TestState::Paid));
        assert!(!record.touched(TestState::Open));
        assert!(!record.touched(TestState::Root));
    }

    #[test]
    fn record_serializes_correctly() {
        let record = record();
        let json = serde_json::to_string(&record).unwrap();
        let deserialized: TransitionRecord<TestState> = serde_json::from_str(&json).unwrap();
        assert_eq!(record, deserialized);
    }
}
