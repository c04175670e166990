//! Concurrent dispatches against the same entity.
//!
//! Each task loads its own handle to the row, so the only thing keeping
//! the dispatches apart is the row lock taken by the coordinator.

use serde::{Deserialize, Serialize};
use statehold::builder::{MachineBuilder, StateBuilder};
use statehold::core::StateKind;
use statehold::effects::{Context, Machine, StateEvent, Target};
use statehold::entity::{Attributes, Entity, MemoryStore, Record, StoreConfig, StoreError};
use statehold::{state_kinds, DispatchError, DispatchOutcome};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

state_kinds! {
    enum Lane {
        Root,
        First,
        Second,
        Third,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Signal {
    Advance,
    Tally,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Row {
    state: Option<Lane>,
    tally: u32,
}

impl Attributes for Row {
    type Kind = Lane;

    fn state(&self) -> Result<Lane, String> {
        self.state.ok_or_else(|| "not started".to_string())
    }
}

type Rec = Record<Row>;
type Declare = StateBuilder<Rec, Signal>;

fn enter(cx: &mut Context<'_, Rec, Signal>) -> Result<(), DispatchError> {
    // Widen the window in which a second dispatch could interleave.
    thread::sleep(Duration::from_millis(20));
    let state = cx.state();
    let row = cx.entity_mut();
    row.attributes_mut().state = Some(state);
    row.save()?;
    Ok(())
}

fn next(state: Lane) -> Option<Lane> {
    match state {
        Lane::First => Some(Lane::Second),
        Lane::Second => Some(Lane::Third),
        _ => None,
    }
}

fn machine() -> Machine<Rec, Signal> {
    let leaf = |kind| {
        Declare::simple(kind)
            .parent(Lane::Root)
            .on_entry(enter)
            .handle(|cx| {
                Ok(match cx.payload() {
                    Signal::Advance => next(cx.state()).map(Target::to),
                    Signal::Tally => None,
                })
            })
    };
    MachineBuilder::new()
        .state(
            Declare::root(Lane::Root)
                .default_substate(Lane::First)
                .handle_internal(|cx| {
                    if *cx.payload() != Signal::Tally {
                        return Ok(false);
                    }
                    let row = cx.entity_mut();
                    let seen = row.attributes().tally;
                    thread::sleep(Duration::from_millis(2));
                    row.attributes_mut().tally = seen + 1;
                    row.save()?;
                    Ok(true)
                }),
        )
        .states(vec![leaf(Lane::First), leaf(Lane::Second), leaf(Lane::Third)])
        .build()
        .unwrap()
}

fn started(store: &MemoryStore<Row>, machine: &Machine<Rec, Signal>) -> Rec {
    let mut row = store
        .create(Row {
            state: None,
            tally: 0,
        })
        .unwrap();
    machine
        .initialize(&mut row, StateEvent::new(Signal::Advance))
        .unwrap();
    row
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_advances_are_serialized() {
    let machine = Arc::new(machine());
    let store = MemoryStore::new();
    let id = started(&store, &machine).id();

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let machine = Arc::clone(&machine);
        let store = store.clone();
        tasks.push(tokio::task::spawn_blocking(move || -> Result<_, DispatchError> {
            let mut row = store.find(id)?;
            machine.send(&mut row, StateEvent::new(Signal::Advance))
        }));
    }

    let mut starts = HashSet::new();
    for task in tasks {
        match task.await.unwrap().unwrap() {
            DispatchOutcome::Transitioned { record, .. } => {
                starts.insert(record.from.unwrap().name().to_string());
            }
            other => panic!("Expected a transition, got {other:?}"),
        }
    }

    // Neither dispatch started from the state the other one left.
    let expected: HashSet<String> = ["First", "Second"].iter().map(|s| s.to_string()).collect();
    assert_eq!(starts, expected);
    assert_eq!(store.load(id).unwrap().state, Some(Lane::Third));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_internal_updates_are_not_lost() {
    let machine = Arc::new(machine());
    let store = MemoryStore::new();
    let id = started(&store, &machine).id();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let machine = Arc::clone(&machine);
            let store = store.clone();
            tokio::task::spawn_blocking(move || -> Result<_, DispatchError> {
                let mut row = store.find(id)?;
                machine.dispatch_or_fail(&mut row, StateEvent::new(Signal::Tally))
            })
        })
        .collect();

    for task in tasks {
        let state = task.await.unwrap().unwrap();
        assert_eq!(state.kind(), Lane::First);
    }

    assert_eq!(store.load(id).unwrap().tally, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_entities_do_not_block_each_other() {
    let machine = Arc::new(machine());
    let store = MemoryStore::new();
    let ids: Vec<_> = (0..4).map(|_| started(&store, &machine).id()).collect();

    let tasks: Vec<_> = ids
        .iter()
        .map(|&id| {
            let machine = Arc::clone(&machine);
            let store = store.clone();
            tokio::task::spawn_blocking(move || -> Result<_, DispatchError> {
                let mut row = store.find(id)?;
                machine.dispatch_or_fail(&mut row, StateEvent::new(Signal::Advance))?;
                machine.dispatch_or_fail(&mut row, StateEvent::new(Signal::Advance))
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().kind(), Lane::Third);
    }
    for id in ids {
        assert_eq!(store.load(id).unwrap().state, Some(Lane::Third));
    }
}

#[test]
fn lock_timeout_aborts_dispatch() {
    let machine = machine();
    let store = MemoryStore::with_config(StoreConfig {
        lock_timeout_ms: 50,
    });
    let mut row = started(&store, &machine);
    let mut holder = store.find(row.id()).unwrap();

    let result: Result<_, DispatchError> = holder.transaction_with_exclusive_lock(|_| {
        Ok(machine.send(&mut row, StateEvent::new(Signal::Advance)))
    });

    assert!(matches!(
        result.unwrap(),
        Err(DispatchError::Store(StoreError::LockTimeout { .. }))
    ));
    assert_eq!(row.current_state().unwrap(), Lane::First);
    assert_eq!(store.load(row.id()).unwrap().state, Some(Lane::First));
}

#[test]
fn panicking_action_rolls_back_and_frees_the_row() {
    let machine = machine();
    let store = MemoryStore::with_config(StoreConfig {
        lock_timeout_ms: 50,
    });
    let mut row = started(&store, &machine);
    let id = row.id();
    let event = StateEvent::new(Signal::Advance).with_action(|row: &mut Rec| {
        row.attributes_mut().tally = 99;
        row.save()?;
        panic!("payment gateway crashed");
    });

    let unwound = panic::catch_unwind(AssertUnwindSafe(|| machine.send(&mut row, event)));

    assert!(unwound.is_err());
    assert!(!row.in_transaction());
    let stored = store.load(id).unwrap();
    assert_eq!(stored.state, Some(Lane::First));
    assert_eq!(stored.tally, 0);

    let mut other = store.find(id).unwrap();
    let state = machine
        .dispatch_or_fail(&mut other, StateEvent::new(Signal::Advance))
        .unwrap();
    assert_eq!(state.kind(), Lane::Second);
}
