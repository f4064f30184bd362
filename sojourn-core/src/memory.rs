//! In-process implementations of the persistence traits.
//!
//! Suitable for a single engine instance; state is lost on restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use tokio::time::Instant;

use crate::SyncError;
use crate::store::{DedupRepository, LockProvider, LockToken, RetryRepository, StateStore};
use sojourn_types::{CircuitState, CursorField, DedupRecord, RetryItem, RetryState};

/// In-memory [`StateStore`].
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    cursors: Mutex<HashMap<CursorField, i64>>,
    circuit: Mutex<Option<CircuitState>>,
    errors: AtomicU32,
}

impl MemoryStateStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn cursor(&self, field: CursorField) -> Result<Option<i64>, SyncError> {
        let cursors = self.cursors.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(cursors.get(&field).copied())
    }

    async fn set_cursor(&self, field: CursorField, ts: i64) -> Result<(), SyncError> {
        self.cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(field, ts);
        Ok(())
    }

    async fn circuit_state(&self) -> Result<Option<CircuitState>, SyncError> {
        Ok(self
            .circuit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn set_circuit_state(&self, state: Option<CircuitState>) -> Result<(), SyncError> {
        *self.circuit.lock().unwrap_or_else(PoisonError::into_inner) = state;
        Ok(())
    }

    async fn consecutive_errors(&self) -> Result<u32, SyncError> {
        Ok(self.errors.load(Ordering::SeqCst))
    }

    async fn increment_consecutive_errors(&self) -> Result<u32, SyncError> {
        Ok(self.errors.fetch_add(1, Ordering::SeqCst).saturating_add(1))
    }

    async fn reset_consecutive_errors(&self) -> Result<(), SyncError> {
        self.errors.store(0, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory [`DedupRepository`] backed by a `moka` cache.
///
/// With a retention period, records older than that are evicted, standing in
/// for the external age-based pruning a database deployment would run.
#[derive(Clone)]
pub struct MemoryDedupRepository {
    records: Cache<String, DedupRecord>,
}

impl MemoryDedupRepository {
    /// Unbounded retention. Records are never evicted, by age or by size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Cache::builder().build(),
        }
    }

    /// Evict records `retention` after they were last written.
    #[must_use]
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            records: Cache::builder().time_to_live(retention).build(),
        }
    }
}

impl Default for MemoryDedupRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DedupRepository for MemoryDedupRepository {
    async fn get(&self, alias: &str) -> Result<Option<DedupRecord>, SyncError> {
        Ok(self.records.get(alias).await)
    }

    async fn put(&self, alias: &str, record: DedupRecord) -> Result<(), SyncError> {
        self.records.insert(alias.to_string(), record).await;
        Ok(())
    }
}

/// In-memory [`RetryRepository`].
#[derive(Debug, Default)]
pub struct MemoryRetryRepository {
    items: Mutex<BTreeMap<u64, RetryItem>>,
    next_id: AtomicU64,
}

impl MemoryRetryRepository {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item verbatim, keeping its id and state. Meant for seeding tests.
    pub fn seed(&self, item: RetryItem) {
        self.next_id.fetch_max(item.id, Ordering::SeqCst);
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item.id, item);
    }
}

#[async_trait]
impl RetryRepository for MemoryRetryRepository {
    async fn insert(&self, mut item: RetryItem) -> Result<RetryItem, SyncError> {
        item.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item.id, item.clone());
        Ok(item)
    }

    async fn get(&self, id: u64) -> Result<Option<RetryItem>, SyncError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(&id).cloned())
    }

    async fn find_active(
        &self,
        reservation_id: &str,
        sink: &str,
    ) -> Result<Option<RetryItem>, SyncError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items
            .values()
            .find(|i| {
                i.reservation_id == reservation_id && i.sink == sink && !i.state.is_terminal()
            })
            .cloned())
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<RetryItem>, SyncError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let mut due: Vec<RetryItem> = items
            .values()
            .filter(|i| i.state == RetryState::Queued && i.next_attempt_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|i| (i.next_attempt_at, i.id));
        due.truncate(limit);
        Ok(due)
    }

    async fn update(&self, item: &RetryItem) -> Result<(), SyncError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        match items.get_mut(&item.id) {
            None => Err(SyncError::Store(format!("retry item {} not found", item.id))),
            Some(stored) if stored.state.is_terminal() => Err(SyncError::Store(format!(
                "retry item {} is {} and cannot change",
                item.id, stored.state
            ))),
            Some(stored) => {
                *stored = item.clone();
                Ok(())
            }
        }
    }

    async fn list(&self, state: Option<RetryState>) -> Result<Vec<RetryItem>, SyncError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items
            .values()
            .filter(|i| state.is_none_or(|s| i.state == s))
            .cloned()
            .collect())
    }
}

/// In-memory [`LockProvider`] with expiry measured on the Tokio clock.
#[derive(Debug, Default)]
pub struct MemoryLockProvider {
    held: Mutex<HashMap<String, (LockToken, Instant)>>,
    next_token: AtomicU64,
}

impl MemoryLockProvider {
    /// No locks held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is currently held and unexpired.
    #[must_use]
    pub fn is_held(&self, key: &str) -> bool {
        let held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.get(key).is_some_and(|(_, until)| Instant::now() < *until)
    }
}

#[async_trait]
impl LockProvider for MemoryLockProvider {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, SyncError> {
        let now = Instant::now();
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, until)) = held.get(key)
            && now < *until
        {
            return Ok(None);
        }
        let token = LockToken(self.next_token.fetch_add(1, Ordering::SeqCst) + 1);
        held.insert(key.to_string(), (token, now + ttl));
        drop(held);
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: LockToken) -> Result<bool, SyncError> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        match held.get(key) {
            Some((owner, _)) if *owner == token => {
                held.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
