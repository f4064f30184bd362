//! Durable per-sink retry queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sojourn_core::{
    Clock, DedupStore, RetryItem, RetryPayload, RetryRepository, RetryState, RetryStats,
    SyncError,
};

use crate::dispatch::Dispatcher;
use crate::locks::{ConcurrencyGuard, reservation_keys};

/// Tally of one [`RetryQueue::retry_due`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    /// Items pulled from the queue.
    pub picked: usize,
    /// Delivered on this attempt.
    pub completed: usize,
    /// Failed again and rescheduled.
    pub requeued: usize,
    /// Moved to `PermanentFailure`.
    pub permanent_failures: usize,
    /// Left untouched because the reservation was locked elsewhere.
    pub busy: usize,
    /// Already delivered by a live dispatch by the time the lock was held.
    pub settled: usize,
    /// Store failures while handling individual items.
    pub errors: usize,
    /// The whole pass was skipped because another retry pass was running.
    pub lock_busy: bool,
}

/// Enqueues failed sink deliveries and re-attempts them on schedule.
#[derive(Clone)]
pub struct RetryQueue {
    repo: Arc<dyn RetryRepository>,
    dispatcher: Arc<Dispatcher>,
    dedup: DedupStore,
    locks: ConcurrencyGuard,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    lock_ttl: Duration,
}

fn chrono_span(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

impl RetryQueue {
    /// Queue over `repo`. Sinks are resolved by name through `dispatcher`.
    #[must_use]
    pub fn new(
        repo: Arc<dyn RetryRepository>,
        dispatcher: Arc<Dispatcher>,
        dedup: DedupStore,
        locks: ConcurrencyGuard,
        clock: Arc<dyn Clock>,
        batch_size: usize,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            repo,
            dispatcher,
            dedup,
            locks,
            clock,
            batch_size,
            lock_ttl,
        }
    }

    /// Record one retry item per failed sink.
    ///
    /// An item still active for the same reservation and sink is refreshed
    /// with the new payload and error instead of being duplicated. Returns the
    /// number of items created or refreshed.
    ///
    /// # Errors
    /// Propagates repository failures; items written before the failure stay written.
    pub async fn enqueue(
        &self,
        reservation_id: &str,
        failures: &[(String, String)],
        payload: &RetryPayload,
        retry_delay: Duration,
    ) -> Result<usize, SyncError> {
        let body = serde_json::to_value(payload)
            .map_err(|e| SyncError::Store(format!("serialize retry payload: {e}")))?;
        let now = self.clock.now();
        let next = now.checked_add_signed(chrono_span(retry_delay)).unwrap_or(now);

        for (sink, error) in failures {
            if let Some(mut existing) = self.repo.find_active(reservation_id, sink).await? {
                existing.payload = Some(body.clone());
                existing.last_error = Some(error.clone());
                existing.updated_at = now;
                self.repo.update(&existing).await?;
                tracing::info!(reservation = reservation_id, sink = %sink, id = existing.id, "retry item refreshed");
                continue;
            }
            let item = self
                .repo
                .insert(RetryItem {
                    id: 0,
                    reservation_id: reservation_id.to_string(),
                    sink: sink.clone(),
                    attempt_count: 0,
                    payload: Some(body.clone()),
                    last_error: Some(error.clone()),
                    next_attempt_at: next,
                    state: RetryState::Queued,
                    created_at: now,
                    updated_at: now,
                })
                .await?;
            tracing::info!(reservation = reservation_id, sink = %sink, id = item.id, next_attempt_at = %next, error = %error, "retry item queued");
        }
        Ok(failures.len())
    }

    /// Complete every active item of `sinks` under any of `aliases`.
    ///
    /// Called after a live dispatch delivered those sinks, so the queued
    /// copies never send again. Returns the number of items closed.
    ///
    /// # Errors
    /// Propagates repository failures.
    pub async fn settle(&self, aliases: &[String], sinks: &[&str]) -> Result<usize, SyncError> {
        let now = self.clock.now();
        let mut settled = 0;
        for alias in aliases {
            for sink in sinks {
                let Some(mut item) = self.repo.find_active(alias, sink).await? else {
                    continue;
                };
                item.state = RetryState::Completed;
                item.last_error = None;
                item.updated_at = now;
                self.repo.update(&item).await?;
                settled += 1;
                tracing::info!(id = item.id, reservation = %item.reservation_id, sink = %item.sink, "retry item settled by live delivery");
            }
        }
        Ok(settled)
    }

    /// Counts per state.
    ///
    /// # Errors
    /// Propagates repository failures.
    pub async fn stats(&self) -> Result<RetryStats, SyncError> {
        let mut stats = RetryStats::default();
        for item in self.repo.list(None).await? {
            match item.state {
                RetryState::Queued => stats.queued += 1,
                RetryState::Processing => stats.processing += 1,
                RetryState::Failed => stats.failed += 1,
                RetryState::PermanentFailure => stats.permanent_failure += 1,
                RetryState::Completed => stats.completed += 1,
            }
        }
        Ok(stats)
    }

    async fn give_up(&self, mut item: RetryItem, reason: &str, now: DateTime<Utc>) -> Result<(), SyncError> {
        item.state = RetryState::PermanentFailure;
        item.last_error = Some(reason.to_string());
        item.updated_at = now;
        self.repo.update(&item).await?;
        tracing::warn!(
            id = item.id,
            reservation = %item.reservation_id,
            sink = %item.sink,
            attempt = item.attempt_count,
            reason,
            "retry item permanently failed"
        );
        Ok(())
    }

    /// Re-attempt every due item.
    ///
    /// # Errors
    /// Only when the due list itself cannot be read; per-item failures are counted.
    pub async fn retry_due(
        &self,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Result<RetryReport, SyncError> {
        let due = self.repo.due(self.clock.now(), self.batch_size).await?;
        let mut report = RetryReport {
            picked: due.len(),
            ..RetryReport::default()
        };
        for item in due {
            let id = item.id;
            match self.retry_one(item, max_attempts, retry_delay).await {
                Ok(Step::Completed) => report.completed += 1,
                Ok(Step::Requeued) => report.requeued += 1,
                Ok(Step::GaveUp) => report.permanent_failures += 1,
                Ok(Step::Busy) => report.busy += 1,
                Ok(Step::Settled) => report.settled += 1,
                Err(e) => {
                    report.errors += 1;
                    tracing::error!(id, error = %e, "retry item could not be processed");
                }
            }
        }
        if report.picked > 0 {
            tracing::info!(?report, "retry pass finished");
        }
        Ok(report)
    }

    async fn retry_one(
        &self,
        item: RetryItem,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Result<Step, SyncError> {
        let now = self.clock.now();
        if item.attempt_count >= max_attempts {
            self.give_up(item, "max attempts reached", now).await?;
            return Ok(Step::GaveUp);
        }
        let payload = match item.decode_payload() {
            Ok(p) => p,
            Err(reason) => {
                self.give_up(item, &reason, now).await?;
                return Ok(Step::GaveUp);
            }
        };
        let Some(sink) = self.dispatcher.sink(&item.sink).cloned() else {
            let reason = format!("unknown sink {}", item.sink);
            self.give_up(item, &reason, now).await?;
            return Ok(Step::GaveUp);
        };

        let keys = reservation_keys(
            payload
                .reservation
                .alias_ids
                .iter()
                .chain(std::iter::once(&item.reservation_id)),
        );
        let Some(locks) = self.locks.try_acquire_all(keys, self.lock_ttl).await? else {
            tracing::debug!(id = item.id, reservation = %item.reservation_id, "reservation busy; retry deferred");
            return Ok(Step::Busy);
        };
        let step = self
            .retry_locked(item.id, sink.as_ref(), max_attempts, retry_delay)
            .await;
        self.locks.release_all(locks).await;
        step
    }

    /// Re-read the item under the reservation locks and attempt it if still active.
    async fn retry_locked(
        &self,
        id: u64,
        sink: &dyn sojourn_core::Sink,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Result<Step, SyncError> {
        let now = self.clock.now();
        let Some(mut item) = self
            .repo
            .get(id)
            .await?
            .filter(|i| !i.state.is_terminal())
        else {
            tracing::debug!(id, "retry item closed while waiting for the reservation");
            return Ok(Step::Settled);
        };
        let payload = match item.decode_payload() {
            Ok(p) => p,
            Err(reason) => {
                self.give_up(item, &reason, now).await?;
                return Ok(Step::GaveUp);
            }
        };
        item.state = RetryState::Processing;
        item.updated_at = now;
        self.repo.update(&item).await?;
        self.attempt(item, sink, &payload, max_attempts, retry_delay)
            .await
    }

    async fn attempt(
        &self,
        mut item: RetryItem,
        sink: &dyn sojourn_core::Sink,
        payload: &RetryPayload,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Result<Step, SyncError> {
        let outcome = sink.send(&payload.reservation, &payload.tracking).await;
        let now = self.clock.now();
        let attempt = item.attempt_count + 1;

        if outcome.success {
            item.state = RetryState::Completed;
            item.attempt_count = attempt;
            item.last_error = None;
            item.updated_at = now;
            self.repo.update(&item).await?;
            let aliases: Vec<String> = payload.reservation.alias_ids.iter().cloned().collect();
            self.dedup
                .mark_processed(&aliases, &payload.reservation.id, &payload.reservation.presence)
                .await?;
            tracing::info!(id = item.id, reservation = %item.reservation_id, sink = %item.sink, attempt, "retry delivered");
            return Ok(Step::Completed);
        }

        let error = outcome.error.unwrap_or_else(|| "unknown error".to_string());
        if outcome.skipped || !outcome.retryable {
            item.attempt_count = attempt;
            self.give_up(item, &error, now).await?;
            return Ok(Step::GaveUp);
        }
        if attempt >= max_attempts {
            item.attempt_count = attempt;
            self.give_up(item, &format!("max attempts reached: {error}"), now)
                .await?;
            return Ok(Step::GaveUp);
        }

        item.attempt_count = attempt;
        item.state = RetryState::Queued;
        item.last_error = Some(error);
        item.next_attempt_at = now.checked_add_signed(chrono_span(retry_delay)).unwrap_or(now);
        item.updated_at = now;
        self.repo.update(&item).await?;
        tracing::info!(
            id = item.id,
            reservation = %item.reservation_id,
            sink = %item.sink,
            attempt,
            next_attempt_at = %item.next_attempt_at,
            "retry failed; rescheduled"
        );
        Ok(Step::Requeued)
    }
}

enum Step {
    Completed,
    Requeued,
    GaveUp,
    Busy,
    Settled,
}
