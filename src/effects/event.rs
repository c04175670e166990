//! Events and their deferred work.
//!
//! A [`StateEvent`] carries a payload plus two FIFO queues:
//!
//! - **actions** mutate the entity while the transition sits in the common
//!   ancestor, after exit hooks and before entry hooks
//! - **side effects** run only after the transition has been committed and
//!   verified, outside the row lock
//!
//! Both queues are drained before their items run, so each item runs at
//! most once no matter how often draining is attempted.

use crate::coordinator::DispatchError;
use crate::entity::Entity;
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// Entity mutation run once during a transition.
pub type Action<En> = Box<dyn FnOnce(&mut En) -> Result<(), DispatchError> + Send>;

/// Non-transactional effect run once after commit.
pub type SideEffect = Box<dyn FnOnce() + Send>;

/// Ordered queue whose items can be taken out exactly once.
pub struct Queue<T> {
    items: VecDeque<T>,
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Take every queued item in FIFO order, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An event dispatched to an entity's state machine.
///
/// Owned by the dispatch call it is passed to and discarded afterwards.
///
/// # Example
///
/// ```rust
/// use statehold::effects::StateEvent;
/// use statehold::entity::{Attributes, Record};
/// use statehold::state_kinds;
/// use serde::{Deserialize, Serialize};
///
/// state_kinds! {
///     enum Door { Root, Closed, Open }
/// }
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct DoorRow { open: bool, opened_count: u32 }
///
/// impl Attributes for DoorRow {
///     type Kind = Door;
///     fn state(&self) -> Result<Door, String> {
///         Ok(if self.open { Door::Open } else { Door::Closed })
///     }
/// }
///
/// enum DoorEvent { Push }
///
/// let mut event: StateEvent<Record<DoorRow>, DoorEvent> = StateEvent::new(DoorEvent::Push)
///     .with_action(|door: &mut Record<DoorRow>| {
///         door.attributes_mut().opened_count += 1;
///         door.save()?;
///         Ok(())
///     });
/// event.defer_side_effect(|| println!("door pushed"));
///
/// assert_eq!(event.pending_actions(), 1);
/// assert_eq!(event.pending_side_effects(), 1);
/// ```
pub struct StateEvent<En: Entity, Ev> {
    id: Uuid,
    payload: Ev,
    actions: Queue<Action<En>>,
    side_effects: Queue<SideEffect>,
    dispatched_to: Option<En::Kind>,
    pub(crate) exited: Vec<En::Kind>,
    pub(crate) entered: Vec<En::Kind>,
}

impl<En: Entity, Ev> StateEvent<En, Ev> {
    pub fn new(payload: Ev) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            actions: Queue::new(),
            side_effects: Queue::new(),
            dispatched_to: None,
            exited: Vec::new(),
            entered: Vec::new(),
        }
    }

    /// Queue an entity mutation for the transition's action phase.
    pub fn with_action<F>(mut self, action: F) -> Self
    where
        F: FnOnce(&mut En) -> Result<(), DispatchError> + Send + 'static,
    {
        self.actions.push(Box::new(action));
        self
    }

    /// Queue work to run after the transition commits.
    ///
    /// May be called from hooks and handlers while the event is processed.
    pub fn defer_side_effect<F>(&mut self, effect: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.side_effects.push(Box::new(effect));
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn payload(&self) -> &Ev {
        &self.payload
    }

    /// Leaf state the event was last dispatched to, if any.
    pub fn dispatched_to(&self) -> Option<En::Kind> {
        self.dispatched_to
    }

    pub(crate) fn set_dispatched_to(&mut self, state: En::Kind) {
        self.dispatched_to = Some(state);
    }

    pub fn pending_actions(&self) -> usize {
        self.actions.len()
    }

    pub fn pending_side_effects(&self) -> usize {
        self.side_effects.len()
    }

    /// Take all queued actions; later calls return nothing.
    pub fn drain_actions(&mut self) -> Vec<Action<En>> {
        self.actions.drain()
    }

    /// Take all queued side effects; later calls return nothing.
    pub fn drain_side_effects(&mut self) -> Vec<SideEffect> {
        self.side_effects.drain()
    }

    /// Run queued actions against the entity, stopping at the first failure.
    pub(crate) fn process_actions(&mut self, entity: &mut En) -> Result<usize, DispatchError> {
        let actions = self.drain_actions();
        let count = actions.len();
        for action in actions {
            action(entity)?;
        }
        if count > 0 {
            debug!(event = %self.id, count, "processed actions");
        }
        Ok(count)
    }

    pub(crate) fn process_side_effects(&mut self) -> usize {
        let effects = self.drain_side_effects();
        let count = effects.len();
        for effect in effects {
            effect();
        }
        if count > 0 {
            debug!(event = %self.id, count, "processed side effects");
        }
        count
    }
}

impl<En: Entity, Ev: fmt::Debug> fmt::Debug for StateEvent<En, Ev> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateEvent")
            .field("id", &self.id)
            .field("payload", &self.payload)
            .field("actions", &self.actions.len())
            .field("side_effects", &self.side_effects.len())
            .field("dispatched_to", &self.dispatched_to)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Attributes, MemoryStore, Record};
    use crate::state_kinds;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    state_kinds! {
        enum Counter {
            Root,
            Counting,
        }
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Tally {
        count: u32,
    }

    impl Attributes for Tally {
        type Kind = Counter;

        fn state(&self) -> Result<Counter, String> {
            Ok(Counter::Counting)
        }
    }

    type Event = StateEvent<Record<Tally>, &'static str>;

    #[test]
    fn queue_drains_exactly_once() {
        let mut queue = Queue::new();
        queue.push(1);
        queue.push(2);

        assert_eq!(queue.drain(), vec![1, 2]);
        assert!(queue.drain().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn actions_run_in_order_once() {
        let store = MemoryStore::new();
        let mut record = store.create(Tally { count: 0 }).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (first, second) = (Arc::clone(&seen), Arc::clone(&seen));

        let mut event: Event = StateEvent::new("tick")
            .with_action(move |_| {
                first.lock().unwrap().push("first");
                Ok(())
            })
            .with_action(move |record: &mut Record<Tally>| {
                second.lock().unwrap().push("second");
                record.attributes_mut().count += 1;
                Ok(())
            });

        assert_eq!(event.process_actions(&mut record).unwrap(), 2);
        assert_eq!(event.process_actions(&mut record).unwrap(), 0);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(record.attributes().count, 1);
    }

    #[test]
    fn failing_action_drops_the_rest() {
        let store = MemoryStore::new();
        let mut record = store.create(Tally { count: 0 }).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let later = Arc::clone(&ran);

        let mut event: Event = StateEvent::new("tick")
            .with_action(|_| Err(DispatchError::aborted("not today")))
            .with_action(move |_| {
                later.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        assert!(event.process_actions(&mut record).is_err());
        assert_eq!(event.process_actions(&mut record).unwrap(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn side_effects_run_once() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let mut event: Event = StateEvent::new("tick");
        event.defer_side_effect(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(event.process_side_effects(), 1);
        assert_eq!(event.process_side_effects(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn events_get_distinct_ids() {
        let a: Event = StateEvent::new("a");
        let b: Event = StateEvent::new("b");
        assert_ne!(a.id(), b.id());
        assert_eq!(*a.payload(), "a");
        assert_eq!(a.dispatched_to(), None);
    }
}
