//! Named locks serializing poll passes, retry passes and per-reservation work.

use std::sync::Arc;
use std::time::Duration;

use sojourn_core::{LockProvider, LockToken, SyncError};

/// Key shared by the continuous and deep-check cadences.
pub const POLL_LOCK: &str = "poll";
/// Key held by a retry pass.
pub const RETRY_LOCK: &str = "retry";
/// Expiry of the retry pass lock.
pub const RETRY_LOCK_TTL: Duration = Duration::from_secs(300);

/// Lock key for one reservation, shared by the poll and webhook paths.
#[must_use]
pub fn reservation_key(id: &str) -> String {
    format!("reservation:{id}")
}

/// Lock keys for every alias of one reservation, sorted and deduplicated.
///
/// Two payloads of the same booking may carry different alias sets; holding
/// every alias makes them contend as long as they share at least one.
#[must_use]
pub fn reservation_keys<I, S>(aliases: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut keys: Vec<String> = aliases
        .into_iter()
        .map(|a| reservation_key(a.as_ref()))
        .collect();
    keys.sort_unstable();
    keys.dedup();
    keys
}

/// Proof that a named lock is held. Hand it back to [`ConcurrencyGuard::release`].
#[derive(Debug)]
#[must_use = "a held lock must be released"]
pub struct HeldLock {
    key: String,
    token: LockToken,
}

impl HeldLock {
    /// Lock key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// A set of locks taken together by [`ConcurrencyGuard::try_acquire_all`].
#[derive(Debug)]
#[must_use = "held locks must be released"]
pub struct HeldLocks {
    held: Vec<HeldLock>,
}

impl HeldLocks {
    /// Keys held, in acquisition order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.held.iter().map(HeldLock::key)
    }
}

/// Thin wrapper over a [`LockProvider`].
#[derive(Clone)]
pub struct ConcurrencyGuard {
    provider: Arc<dyn LockProvider>,
}

impl ConcurrencyGuard {
    /// Guard over `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn LockProvider>) -> Self {
        Self { provider }
    }

    /// Try to take `key` for `ttl`; `None` when another holder has it.
    ///
    /// # Errors
    /// Propagates provider failures.
    pub async fn try_acquire(
        &self,
        key: impl Into<String>,
        ttl: Duration,
    ) -> Result<Option<HeldLock>, SyncError> {
        let key = key.into();
        Ok(self
            .provider
            .try_acquire(&key, ttl)
            .await?
            .map(|token| HeldLock { key, token }))
    }

    /// Release a held lock. A lock that already expired is logged, not treated as an error.
    pub async fn release(&self, held: HeldLock) {
        match self.provider.release(&held.key, held.token).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(key = %held.key, "lock expired before release"),
            Err(e) => tracing::error!(key = %held.key, error = %e, "failed to release lock"),
        }
    }

    /// Take every key in `keys` or none of them.
    ///
    /// Keys are taken in sorted order. When one is busy, the ones already
    /// taken are released and `None` is returned.
    ///
    /// # Errors
    /// Propagates provider failures, after releasing what was taken.
    pub async fn try_acquire_all(
        &self,
        mut keys: Vec<String>,
        ttl: Duration,
    ) -> Result<Option<HeldLocks>, SyncError> {
        keys.sort_unstable();
        keys.dedup();
        let mut held = HeldLocks {
            held: Vec::with_capacity(keys.len()),
        };
        for key in keys {
            match self.try_acquire(key, ttl).await {
                Ok(Some(lock)) => held.held.push(lock),
                Ok(None) => {
                    self.release_all(held).await;
                    return Ok(None);
                }
                Err(e) => {
                    self.release_all(held).await;
                    return Err(e);
                }
            }
        }
        Ok(Some(held))
    }

    /// Release a lock set in reverse acquisition order.
    pub async fn release_all(&self, locks: HeldLocks) {
        for lock in locks.held.into_iter().rev() {
            self.release(lock).await;
        }
    }
}
