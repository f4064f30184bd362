//! Upstream circuit breaker persisted in the [`StateStore`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sojourn_core::{CircuitPolicy, CircuitState, Clock, StateStore, SyncError, TimestampGuard};

/// Result of [`CircuitBreaker::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitCheck {
    /// Polling may proceed.
    Closed,
    /// Polling is suspended until `until`.
    Open {
        /// End of the cooldown.
        until: DateTime<Utc>,
    },
    /// The cooldown just ended; state was cleared and cursors reset.
    Recovered,
}

/// What [`CircuitBreaker::record_error`] did with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorVerdict {
    /// Upstream rejected the cursor; cursors were reset conservatively.
    ConservativeReset,
    /// Counted; the circuit is still closed.
    Counted(u32),
    /// Threshold reached; the circuit is open until `until`.
    Opened {
        /// End of the cooldown.
        until: DateTime<Utc>,
    },
    /// Not an upstream health signal.
    Ignored,
}

/// Opens after `error_threshold` consecutive failing fetches and stays open for `cooldown`.
#[derive(Clone)]
pub struct CircuitBreaker {
    state: Arc<dyn StateStore>,
    timestamps: TimestampGuard,
    clock: Arc<dyn Clock>,
    policy: CircuitPolicy,
}

impl CircuitBreaker {
    /// Breaker persisting into `state`.
    #[must_use]
    pub fn new(
        state: Arc<dyn StateStore>,
        timestamps: TimestampGuard,
        clock: Arc<dyn Clock>,
        policy: CircuitPolicy,
    ) -> Self {
        Self {
            state,
            timestamps,
            clock,
            policy,
        }
    }

    /// Current persisted state, if open or not yet cleared.
    ///
    /// # Errors
    /// Propagates state store failures.
    pub async fn status(&self) -> Result<Option<CircuitState>, SyncError> {
        self.state.circuit_state().await
    }

    /// Decide whether a pass may fetch. Clears an expired circuit and resets cursors.
    ///
    /// # Errors
    /// Propagates state store failures.
    pub async fn check(&self) -> Result<CircuitCheck, SyncError> {
        let Some(open) = self.state.circuit_state().await? else {
            return Ok(CircuitCheck::Closed);
        };
        if self.clock.now() < open.until {
            return Ok(CircuitCheck::Open { until: open.until });
        }
        self.state.set_circuit_state(None).await?;
        self.timestamps.reset_all("circuit breaker recovered").await?;
        tracing::info!(opened_at = %open.opened_at, reason = %open.reason, "circuit breaker closed");
        Ok(CircuitCheck::Recovered)
    }

    /// Note a successful upstream fetch.
    ///
    /// # Errors
    /// Propagates state store failures.
    pub async fn record_success(&self) -> Result<(), SyncError> {
        self.state.reset_consecutive_errors().await
    }

    /// Note a failed upstream fetch.
    ///
    /// # Errors
    /// Propagates state store failures.
    pub async fn record_error(&self, err: &SyncError) -> Result<ErrorVerdict, SyncError> {
        if err.is_timestamp_too_old() {
            self.timestamps
                .conservative_reset("upstream rejected cursor as too old")
                .await?;
            return Ok(ErrorVerdict::ConservativeReset);
        }
        if !err.counts_toward_circuit() {
            return Ok(ErrorVerdict::Ignored);
        }

        let count = self.state.increment_consecutive_errors().await?;
        if count < self.policy.error_threshold {
            tracing::warn!(consecutive_errors = count, threshold = self.policy.error_threshold, error = %err, "upstream error");
            return Ok(ErrorVerdict::Counted(count));
        }

        self.timestamps.reset_all("circuit breaker opened").await?;
        let now = self.clock.now();
        let cooldown = Duration::from_std(self.policy.cooldown).unwrap_or(Duration::MAX);
        let until = now.checked_add_signed(cooldown).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.state
            .set_circuit_state(Some(CircuitState {
                until,
                opened_at: now,
                reason: err.to_string(),
            }))
            .await?;
        tracing::error!(consecutive_errors = count, until = %until, error = %err, "circuit breaker opened");
        Ok(ErrorVerdict::Opened { until })
    }

    /// Close the circuit and zero the counter without touching cursors.
    ///
    /// # Errors
    /// Propagates state store failures.
    pub async fn reset(&self) -> Result<(), SyncError> {
        self.state.set_circuit_state(None).await?;
        self.state.reset_consecutive_errors().await
    }
}
