//! In-memory entity storage with row locks and transactions.
//!
//! Rows are kept encoded with `bincode`, so every refresh is a real decode
//! that throws away whatever the caller held in memory. Locks are per row
//! and support shared and exclusive holders with a bounded wait.
//!
//! Transactions write through to the row and keep an undo image of the
//! row as it was before the first write; rollback restores that image
//! while the transaction still holds the row lock. A panic inside a
//! transaction rolls it back the same way before the panic propagates.

use super::{Entity, LockMode, StoreError};
use crate::core::StateKind;
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Attributes of an in-memory entity.
///
/// `state` derives the entity's current state from its attributes, and
/// must not depend on anything else.
pub trait Attributes: Serialize + DeserializeOwned + Send + 'static {
    type Kind: StateKind;

    fn state(&self) -> Result<Self::Kind, String>;
}

/// Settings for a [`MemoryStore`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long to wait for a row lock before giving up.
    pub lock_timeout_ms: u64,
}

impl StoreConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
        }
    }
}

#[derive(Default)]
struct LockState {
    exclusive: bool,
    shared: usize,
}

impl LockState {
    fn admits(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::None => true,
            LockMode::Shared => !self.exclusive,
            LockMode::ForUpdate => !self.exclusive && self.shared == 0,
        }
    }

    /// Whether a holder of one shared lock may turn it into an exclusive one.
    fn admits_upgrade(&self) -> bool {
        !self.exclusive && self.shared == 1
    }
}

struct Row {
    data: Mutex<Vec<u8>>,
    lock: Mutex<LockState>,
    released: Condvar,
}

impl Row {
    fn new(data: Vec<u8>) -> Self {
        Self {
            data: Mutex::new(data),
            lock: Mutex::new(LockState::default()),
            released: Condvar::new(),
        }
    }

    fn read(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    fn write(&self, bytes: Vec<u8>) {
        *self.data.lock() = bytes;
    }

    /// Wait until `ready` holds for the lock state, or time out.
    fn wait_for(
        &self,
        timeout: Duration,
        entity: Uuid,
        ready: impl Fn(&LockState) -> bool,
    ) -> Result<MutexGuard<'_, LockState>, StoreError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock.lock();
        while !ready(&state) {
            if self.released.wait_until(&mut state, deadline).timed_out() && !ready(&state) {
                return Err(StoreError::LockTimeout {
                    entity: entity.to_string(),
                    waited: timeout,
                });
            }
        }
        Ok(state)
    }
}

/// Held row lock; released on drop.
struct RowGuard {
    row: Arc<Row>,
    mode: LockMode,
}

impl RowGuard {
    fn acquire(
        row: &Arc<Row>,
        mode: LockMode,
        timeout: Duration,
        entity: Uuid,
    ) -> Result<Self, StoreError> {
        let mut state = row.wait_for(timeout, entity, |state| state.admits(mode))?;
        match mode {
            LockMode::None => {}
            LockMode::Shared => state.shared += 1,
            LockMode::ForUpdate => state.exclusive = true,
        }
        Ok(Self {
            row: Arc::clone(row),
            mode,
        })
    }

    /// Turn a held shared lock into an exclusive one.
    ///
    /// The shared hold is kept while waiting, so no writer can slip in
    /// between. On timeout the guard still holds its shared lock.
    fn upgrade(&mut self, timeout: Duration, entity: Uuid) -> Result<(), StoreError> {
        let mut state = self.row.wait_for(timeout, entity, LockState::admits_upgrade)?;
        state.shared -= 1;
        state.exclusive = true;
        drop(state);
        self.mode = LockMode::ForUpdate;
        Ok(())
    }
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        let mut state = self.row.lock.lock();
        match self.mode {
            LockMode::None => return,
            LockMode::Shared => state.shared = state.shared.saturating_sub(1),
            LockMode::ForUpdate => state.exclusive = false,
        }
        self.row.released.notify_all();
    }
}

/// Thread-safe, cloneable in-memory entity table.
pub struct MemoryStore<A> {
    rows: Arc<RwLock<HashMap<Uuid, Arc<Row>>>>,
    config: StoreConfig,
    _attributes: PhantomData<fn() -> A>,
}

impl<A> Clone for MemoryStore<A> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
            config: self.config.clone(),
            _attributes: PhantomData,
        }
    }
}

impl<A: Attributes> Default for MemoryStore<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Attributes> MemoryStore<A> {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            config,
            _attributes: PhantomData,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Insert a new row and return a clean handle to it.
    pub fn create(&self, attributes: A) -> Result<Record<A>, StoreError> {
        let id = Uuid::new_v4();
        let bytes = encode(&attributes)?;
        self.rows
            .write()
            .insert(id, Arc::new(Row::new(bytes.clone())));
        Ok(Record {
            id,
            store: self.clone(),
            attributes,
            snapshot: bytes,
            transaction: None,
        })
    }

    /// Load a fresh handle to an existing row.
    pub fn find(&self, id: Uuid) -> Result<Record<A>, StoreError> {
        let bytes = self.row(id)?.read();
        Ok(Record {
            id,
            store: self.clone(),
            attributes: decode(&bytes)?,
            snapshot: bytes,
            transaction: None,
        })
    }

    /// Read the attributes currently stored for `id`, without locking.
    pub fn load(&self, id: Uuid) -> Result<A, StoreError> {
        decode(&self.row(id)?.read())
    }

    /// Overwrite a row without taking its lock, as a writer that ignores
    /// row locks would.
    pub fn write_unlocked(&self, id: Uuid, attributes: &A) -> Result<(), StoreError> {
        self.row(id)?.write(encode(attributes)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    fn row(&self, id: Uuid) -> Result<Arc<Row>, StoreError> {
        self.rows
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn lock(&self, id: Uuid, mode: LockMode) -> Result<RowGuard, StoreError> {
        RowGuard::acquire(&self.row(id)?, mode, self.config.lock_timeout(), id)
    }
}

#[derive(Default)]
struct Transaction {
    guard: Option<RowGuard>,
    undo: Option<Vec<u8>>,
}

impl Transaction {
    fn holds(&self, mode: LockMode) -> bool {
        match (&self.guard, mode) {
            (_, LockMode::None) => true,
            (Some(guard), LockMode::Shared) => guard.mode != LockMode::None,
            (Some(guard), LockMode::ForUpdate) => guard.mode == LockMode::ForUpdate,
            (None, _) => false,
        }
    }

    /// Take `mode` on the row for the rest of the transaction.
    fn acquire<A: Attributes>(
        &mut self,
        store: &MemoryStore<A>,
        id: Uuid,
        mode: LockMode,
    ) -> Result<(), StoreError> {
        if self.holds(mode) {
            return Ok(());
        }
        if let Some(guard) = self.guard.as_mut() {
            if guard.mode == LockMode::Shared {
                return guard.upgrade(store.config.lock_timeout(), id);
            }
        }
        self.guard = Some(store.lock(id, mode)?);
        Ok(())
    }
}

/// Handle to one row of a [`MemoryStore`], holding its attributes in memory.
pub struct Record<A> {
    id: Uuid,
    store: MemoryStore<A>,
    attributes: A,
    snapshot: Vec<u8>,
    transaction: Option<Transaction>,
}

impl<A: Attributes> Record<A> {
    pub fn attributes(&self) -> &A {
        &self.attributes
    }

    /// Mutable access; changes are local until [`save`](Self::save).
    pub fn attributes_mut(&mut self) -> &mut A {
        &mut self.attributes
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Persist in-memory attributes to the row.
    ///
    /// Inside a transaction the row is locked exclusively until the
    /// transaction ends; outside one the lock is held only for the write.
    pub fn save(&mut self) -> Result<(), StoreError> {
        let bytes = encode(&self.attributes)?;
        let row = self.store.row(self.id)?;
        match self.transaction.as_mut() {
            Some(transaction) => {
                transaction.acquire(&self.store, self.id, LockMode::ForUpdate)?;
                if transaction.undo.is_none() {
                    transaction.undo = Some(row.read());
                }
                row.write(bytes.clone());
            }
            None => {
                let _guard = self.store.lock(self.id, LockMode::ForUpdate)?;
                row.write(bytes.clone());
            }
        }
        self.snapshot = bytes;
        Ok(())
    }

    fn lock(&mut self, mode: LockMode) -> Result<(), StoreError> {
        match self.transaction.as_mut() {
            Some(transaction) => transaction.acquire(&self.store, self.id, mode)?,
            None => {
                self.store.lock(self.id, mode)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self, commit: bool) {
        let Some(transaction) = self.transaction.take() else {
            return;
        };
        if !commit {
            if let (Some(undo), Ok(row)) = (transaction.undo, self.store.row(self.id)) {
                row.write(undo);
            }
        }
        drop(transaction.guard);
    }
}

impl<A: Attributes> Entity for Record<A> {
    type Kind = A::Kind;
    type Id = Uuid;

    fn id(&self) -> Uuid {
        self.id
    }

    fn current_state(&self) -> Result<A::Kind, StoreError> {
        self.attributes
            .state()
            .map_err(|reason| StoreError::InvalidState {
                entity: self.id.to_string(),
                reason,
            })
    }

    fn refresh(&mut self, lock: LockMode) -> Result<(), StoreError> {
        self.lock(lock)?;
        let bytes = self.store.row(self.id)?.read();
        self.attributes = decode(&bytes)?;
        self.snapshot = bytes;
        Ok(())
    }

    fn is_dirty(&self) -> bool {
        encode(&self.attributes).map_or(true, |bytes| bytes != self.snapshot)
    }

    fn transaction<T, E, F>(&mut self, body: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        if self.transaction.is_some() {
            return body(self);
        }
        self.transaction = Some(Transaction::default());
        match panic::catch_unwind(AssertUnwindSafe(|| body(&mut *self))) {
            Ok(result) => {
                self.finish(result.is_ok());
                result
            }
            Err(payload) => {
                // Restore the row and release its lock before unwinding further.
                self.finish(false);
                panic::resume_unwind(payload)
            }
        }
    }
}

fn encode<A: Serialize>(attributes: &A) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(attributes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<A: DeserializeOwned>(bytes: &[u8]) -> Result<A, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}
