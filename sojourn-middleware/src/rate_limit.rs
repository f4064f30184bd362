//! Sliding-window attempt log keyed by an arbitrary string.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Outcome of a single [`RateLimiter::attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the attempt was admitted and recorded.
    pub allowed: bool,
    /// Attempts left in the current window after this one.
    pub remaining: u32,
    /// When rejected, how long until the oldest attempt leaves the window (at least 1s).
    pub retry_after: Duration,
}

/// Per-key sliding-window limiter.
///
/// Only admitted attempts are recorded, so a caller hammering a closed key
/// does not extend its own lockout.
#[derive(Debug, Default)]
pub struct RateLimiter {
    log: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to record one attempt for `key` under `max_attempts` per `window`.
    pub fn attempt(&self, key: &str, max_attempts: u32, window: Duration) -> RateDecision {
        let now = Instant::now();
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = log.entry(key.to_string()).or_default();
        while entries
            .front()
            .is_some_and(|t| now.duration_since(*t) >= window)
        {
            entries.pop_front();
        }

        let used = u32::try_from(entries.len()).unwrap_or(u32::MAX);
        if used >= max_attempts {
            let oldest = entries.front().copied().unwrap_or(now);
            let wait = window.saturating_sub(now.duration_since(oldest));
            return RateDecision {
                allowed: false,
                remaining: 0,
                retry_after: wait.max(Duration::from_secs(1)),
            };
        }

        entries.push_back(now);
        RateDecision {
            allowed: true,
            remaining: max_attempts - used - 1,
            retry_after: Duration::ZERO,
        }
    }

    /// Attempts left for `key` right now, without recording anything.
    #[must_use]
    pub fn remaining(&self, key: &str, max_attempts: u32, window: Duration) -> u32 {
        let now = Instant::now();
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        let used = log.get(key).map_or(0, |entries| {
            entries
                .iter()
                .filter(|t| now.duration_since(**t) < window)
                .count()
        });
        max_attempts.saturating_sub(u32::try_from(used).unwrap_or(u32::MAX))
    }

    /// Forget all history for `key`.
    pub fn clear(&self, key: &str) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
