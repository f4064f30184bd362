//! Persistence collaborator traits.
//!
//! Every mutation is a single-key operation; the engine never relies on
//! multi-key transactions and tolerates partially applied updates.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::SyncError;
use sojourn_types::{CircuitState, CursorField, DedupRecord, RetryItem, RetryState};

/// Key/value state: poll cursors, circuit state and the consecutive-error counter.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a cursor (Unix seconds).
    async fn cursor(&self, field: CursorField) -> Result<Option<i64>, SyncError>;

    /// Overwrite a cursor.
    async fn set_cursor(&self, field: CursorField, ts: i64) -> Result<(), SyncError>;

    /// Read the circuit state, if the circuit was ever opened and not cleared.
    async fn circuit_state(&self) -> Result<Option<CircuitState>, SyncError>;

    /// Overwrite or clear the circuit state.
    async fn set_circuit_state(&self, state: Option<CircuitState>) -> Result<(), SyncError>;

    /// Current consecutive-error count.
    async fn consecutive_errors(&self) -> Result<u32, SyncError>;

    /// Atomically increment the consecutive-error count and return the new value.
    async fn increment_consecutive_errors(&self) -> Result<u32, SyncError>;

    /// Reset the consecutive-error count to zero.
    async fn reset_consecutive_errors(&self) -> Result<(), SyncError>;
}

/// Alias-keyed dedup records.
#[async_trait]
pub trait DedupRepository: Send + Sync {
    /// Look up the record stored under `alias`.
    async fn get(&self, alias: &str) -> Result<Option<DedupRecord>, SyncError>;

    /// Insert or overwrite the record stored under `alias`.
    async fn put(&self, alias: &str, record: DedupRecord) -> Result<(), SyncError>;
}

/// Durable retry queue storage.
#[async_trait]
pub trait RetryRepository: Send + Sync {
    /// Store a new item; the repository assigns `id`.
    async fn insert(&self, item: RetryItem) -> Result<RetryItem, SyncError>;

    /// Fetch an item by id.
    async fn get(&self, id: u64) -> Result<Option<RetryItem>, SyncError>;

    /// Non-terminal item for a reservation/sink pair, if any.
    async fn find_active(
        &self,
        reservation_id: &str,
        sink: &str,
    ) -> Result<Option<RetryItem>, SyncError>;

    /// `Queued` items with `next_attempt_at <= now`, oldest first, at most `limit`.
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<RetryItem>, SyncError>;

    /// Overwrite an existing item. Items already in a terminal state are immutable.
    async fn update(&self, item: &RetryItem) -> Result<(), SyncError>;

    /// All items, optionally filtered by state.
    async fn list(&self, state: Option<RetryState>) -> Result<Vec<RetryItem>, SyncError>;
}

/// Opaque proof of lock ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken(pub u64);

/// Named mutual-exclusion locks with expiry.
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Try to take `key` for at most `ttl`. Returns `None` when someone else holds it.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, SyncError>;

    /// Release `key` if still held with `token`. Returns whether it was released.
    async fn release(&self, key: &str, token: LockToken) -> Result<bool, SyncError>;
}
