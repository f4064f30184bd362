//! Clamping of poll cursors into a window the upstream API accepts.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::SyncError;
use crate::clock::Clock;
use crate::store::StateStore;
use sojourn_types::{CursorField, TimestampPolicy};

const MISSING_FALLBACK: Duration = Duration::hours(2);
const FUTURE_FALLBACK: Duration = Duration::hours(1);
const ABSURD_AGE: Duration = Duration::days(365);

/// Validates and repairs cursor timestamps before they reach the upstream API.
///
/// Every value returned by [`TimestampGuard::validate`] lies in
/// `[now - max_lookback, now + max_lookahead]`, and feeding a validated value
/// back in returns it unchanged.
#[derive(Clone)]
pub struct TimestampGuard {
    clock: Arc<dyn Clock>,
    state: Arc<dyn StateStore>,
    policy: TimestampPolicy,
}

impl TimestampGuard {
    /// Create a guard over `state` using `policy` bounds.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, state: Arc<dyn StateStore>, policy: TimestampPolicy) -> Self {
        Self {
            clock,
            state,
            policy,
        }
    }

    /// Lookback/lookahead bounds in use.
    #[must_use]
    pub const fn policy(&self) -> &TimestampPolicy {
        &self.policy
    }

    fn span(d: std::time::Duration) -> Duration {
        Duration::from_std(d).unwrap_or(Duration::MAX)
    }

    fn shift(now: DateTime<Utc>, by: Duration) -> i64 {
        now.checked_sub_signed(by).unwrap_or(now).timestamp()
    }

    /// Clamp `ts` (Unix seconds) into the accepted window.
    pub fn validate(&self, ts: Option<i64>, context: &str) -> i64 {
        let now = self.clock.now();
        let oldest = Self::shift(now, Self::span(self.policy.max_lookback));
        let newest = now
            .checked_add_signed(Self::span(self.policy.max_lookahead))
            .unwrap_or(now)
            .timestamp();

        let Some(ts) = ts else {
            let fixed = Self::shift(now, MISSING_FALLBACK);
            tracing::warn!(
                context,
                after = %rfc3339(fixed),
                "cursor missing; starting two hours back"
            );
            return fixed.max(oldest);
        };

        if ts < 0 || ts < Self::shift(now, ABSURD_AGE) {
            tracing::warn!(
                context,
                raw = ts,
                after = %rfc3339(oldest),
                "cursor is negative or more than a year old; clamping to max lookback"
            );
            return oldest;
        }
        if ts < oldest {
            tracing::warn!(
                context,
                before = %rfc3339(ts),
                after = %rfc3339(oldest),
                "cursor older than max lookback; clamping"
            );
            return oldest;
        }
        if ts > newest {
            let fixed = Self::shift(now, FUTURE_FALLBACK).max(oldest);
            tracing::warn!(
                context,
                before = %rfc3339(ts),
                after = %rfc3339(fixed),
                "cursor in the future; pulling back to one hour ago"
            );
            return fixed;
        }
        ts
    }

    /// Like [`validate`](Self::validate) for loosely typed input; non-numeric values count as missing.
    pub fn validate_value(&self, value: Option<&Value>, context: &str) -> i64 {
        let ts = value.and_then(|v| match v {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        });
        self.validate(ts, context)
    }

    /// Read and validate a stored cursor.
    ///
    /// # Errors
    /// Propagates state store failures.
    pub async fn cursor(&self, field: CursorField) -> Result<i64, SyncError> {
        let raw = self.state.cursor(field).await?;
        Ok(self.validate(raw, field.key()))
    }

    /// Move every cursor to `now - reset_lookback` and zero the consecutive-error counter.
    ///
    /// # Errors
    /// Propagates state store failures; cursors written before the failure stay written.
    pub async fn reset_all(&self, reason: &str) -> Result<i64, SyncError> {
        let target = Self::shift(self.clock.now(), Self::span(self.policy.reset_lookback));
        for field in CursorField::ALL {
            self.state.set_cursor(field, target).await?;
        }
        self.state.reset_consecutive_errors().await?;
        tracing::warn!(reason, cursor = %rfc3339(target), "all poll cursors reset");
        Ok(target)
    }

    /// Reset used when upstream rejects a cursor as too old.
    ///
    /// # Errors
    /// Propagates state store failures.
    pub async fn conservative_reset(&self, reason: &str) -> Result<i64, SyncError> {
        self.reset_all(reason).await
    }
}

fn rfc3339(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0).map_or_else(|| ts.to_string(), |d| d.to_rfc3339())
}
