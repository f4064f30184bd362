//! Continuous and deep-check poll passes.

use std::fmt;

use chrono::{DateTime, Days, Duration, Utc};
use serde::Serialize;
use sojourn_core::{
    CursorField, DateRangeQuery, DateType, DedupStore, DispatchResult, DispatchStatus,
    ProcessDecision, RawReservation, RetryPayload, SinkStatus, SkipReason, SyncError,
};
use tokio::time::Instant;

use crate::Engine;
use crate::circuit::CircuitCheck;
use crate::locks::{POLL_LOCK, reservation_keys};

/// Which poll cadence a pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// Frequent pass over the delta-update cursor.
    Continuous,
    /// Infrequent multi-day sweep.
    DeepCheck,
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Continuous => "continuous",
            Self::DeepCheck => "deep_check",
        })
    }
}

/// How a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    /// The pass ran; see the counters for what happened.
    Completed,
    /// Another pass held the poll lock.
    LockBusy,
    /// The circuit breaker is open; nothing was fetched.
    CircuitOpen,
}

/// Counters for one poll pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Cadence of the pass.
    pub cadence: Cadence,
    /// Raw records returned by every fetch of the pass.
    pub fetched: usize,
    /// New reservations dispatched successfully.
    pub new: usize,
    /// Status updates dispatched successfully.
    pub status_updates: usize,
    /// Records without dates or identifiers.
    pub skipped: usize,
    /// Records already processed.
    pub duplicates: usize,
    /// Records whose reservation lock was held elsewhere.
    pub concurrent: usize,
    /// Dispatches where some sinks failed.
    pub partial: usize,
    /// Dispatches where every attempted sink failed, plus records that faulted.
    pub failed: usize,
    /// Failed upstream fetches.
    pub errors: usize,
    /// The batch budget ran out; another pass should follow immediately.
    pub continuation_needed: bool,
    /// How the pass ended.
    pub outcome: PassOutcome,
}

impl PassReport {
    fn new(cadence: Cadence, outcome: PassOutcome) -> Self {
        Self {
            cadence,
            fetched: 0,
            new: 0,
            status_updates: 0,
            skipped: 0,
            duplicates: 0,
            concurrent: 0,
            partial: 0,
            failed: 0,
            errors: 0,
            continuation_needed: false,
            outcome,
        }
    }

    fn tally(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Skipped(SkipReason::Duplicate) => self.duplicates += 1,
            ItemOutcome::Skipped(_) => self.skipped += 1,
            ItemOutcome::Concurrent => self.concurrent += 1,
            ItemOutcome::Dispatched(r) => match r.status {
                DispatchStatus::Success if r.is_status_update => self.status_updates += 1,
                DispatchStatus::Success => self.new += 1,
                DispatchStatus::Partial => self.partial += 1,
                DispatchStatus::Failed => self.failed += 1,
            },
        }
    }
}

/// What happened to a single raw record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Not dispatched.
    Skipped(SkipReason),
    /// Another path holds the reservation lock; picked up on a later pass.
    Concurrent,
    /// Sent to the sinks.
    Dispatched(DispatchResult),
}

enum Fetch {
    Updated { since: i64 },
    Range(DateRangeQuery),
}

impl fmt::Display for Fetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Updated { since } => write!(f, "updates since {since}"),
            Self::Range(q) => write!(f, "{} {}..{}", q.date_type, q.from, q.to),
        }
    }
}

impl Engine {
    /// Run one continuous pass.
    ///
    /// Behavior:
    /// - Skipped with [`PassOutcome::LockBusy`] when another pass holds the poll lock.
    /// - Skipped with [`PassOutcome::CircuitOpen`] while the breaker cools down.
    /// - Fetches updates since the validated `last_update_check` cursor, then
    ///   (with status updates enabled) today's in-house reservations.
    /// - Advances the cursor to the pass start minus the overlap only when
    ///   every fetch succeeded and the batch budget was not exceeded.
    ///
    /// # Errors
    /// Only persistence failures; upstream errors are counted in the report.
    #[tracing::instrument(name = "sojourn::poll::continuous", skip(self))]
    pub async fn run_continuous(&self) -> Result<PassReport, SyncError> {
        self.run_pass(Cadence::Continuous).await
    }

    /// Run one deep-check pass over the last `deep_lookback_days` days.
    ///
    /// # Errors
    /// Only persistence failures; upstream errors are counted in the report.
    #[tracing::instrument(name = "sojourn::poll::deep_check", skip(self))]
    pub async fn run_deep_check(&self) -> Result<PassReport, SyncError> {
        self.run_pass(Cadence::DeepCheck).await
    }

    /// Process one raw record arriving outside the poll loop, e.g. from an inbound webhook.
    ///
    /// Shares the dedup store and reservation locks with the poller, so a
    /// record racing a poll pass is dispatched by exactly one of them.
    ///
    /// # Errors
    /// Persistence failures.
    #[tracing::instrument(name = "sojourn::ingest", skip(self, raw), fields(fields = raw.len()))]
    pub async fn ingest(&self, raw: &RawReservation) -> Result<ItemOutcome, SyncError> {
        self.process_one(raw).await
    }

    async fn run_pass(&self, cadence: Cadence) -> Result<PassReport, SyncError> {
        let ttl = match cadence {
            Cadence::Continuous => self.cfg.poll.continuous_lock_ttl,
            Cadence::DeepCheck => self.cfg.poll.deep_lock_ttl,
        };
        let Some(lock) = self.locks.try_acquire(POLL_LOCK, ttl).await? else {
            tracing::info!(%cadence, "poll already in progress; pass skipped");
            return Ok(PassReport::new(cadence, PassOutcome::LockBusy));
        };
        let result = self.pass_locked(cadence).await;
        self.locks.release(lock).await;
        if let Ok(report) = &result {
            tracing::info!(
                %cadence,
                fetched = report.fetched,
                new = report.new,
                status_updates = report.status_updates,
                skipped = report.skipped,
                duplicates = report.duplicates,
                concurrent = report.concurrent,
                partial = report.partial,
                failed = report.failed,
                errors = report.errors,
                continuation = report.continuation_needed,
                "poll pass finished"
            );
        }
        result
    }

    async fn pass_locked(&self, cadence: Cadence) -> Result<PassReport, SyncError> {
        let mut report = PassReport::new(cadence, PassOutcome::Completed);
        match self.circuit.check().await? {
            CircuitCheck::Open { until } => {
                tracing::info!(%cadence, until = %until, "circuit open; pass skipped");
                report.outcome = PassOutcome::CircuitOpen;
                return Ok(report);
            }
            CircuitCheck::Recovered => tracing::info!(%cadence, "resuming after circuit cooldown"),
            CircuitCheck::Closed => {}
        }

        let pass_start = self.clock.now();
        let deadline = Instant::now() + self.cfg.poll.batch_budget;

        for fetch in self.plan(cadence, pass_start).await? {
            let records = match self.fetch(&fetch).await {
                Ok(records) => records,
                Err(e) => {
                    report.errors += 1;
                    let verdict = self.circuit.record_error(&e).await?;
                    tracing::warn!(%cadence, fetch = %fetch, error = %e, ?verdict, "fetch failed; pass stopped");
                    break;
                }
            };
            tracing::debug!(%cadence, fetch = %fetch, count = records.len(), "fetched");
            report.fetched += records.len();
            if !self.process_batch(&records, deadline, &mut report).await {
                break;
            }
        }

        if report.errors > 0 {
            return Ok(report);
        }
        self.circuit.record_success().await?;
        if report.continuation_needed {
            return Ok(report);
        }
        self.advance_cursors(cadence, pass_start).await?;
        Ok(report)
    }

    async fn plan(&self, cadence: Cadence, now: DateTime<Utc>) -> Result<Vec<Fetch>, SyncError> {
        let today = now.date_naive();
        let limit = self.cfg.poll.fetch_limit;
        let mut plan = Vec::with_capacity(2);
        match cadence {
            Cadence::Continuous => {
                let since = self.timestamps.cursor(CursorField::LastUpdateCheck).await?;
                plan.push(Fetch::Updated { since });
                if self.cfg.allow_status_updates {
                    plan.push(Fetch::Range(DateRangeQuery::new(
                        DateType::Presence,
                        today,
                        today,
                        limit,
                    )?));
                }
            }
            Cadence::DeepCheck => {
                let days = self.cfg.poll.deep_lookback_days;
                let back = now
                    .checked_sub_signed(Duration::days(i64::from(days)))
                    .map(|t| t.timestamp());
                let since = self.timestamps.validate(back, "deep_check");
                let from = today
                    .checked_sub_days(Days::new(u64::from(days)))
                    .unwrap_or(today);
                let to = today.checked_add_days(Days::new(1)).unwrap_or(today);
                plan.push(Fetch::Updated { since });
                plan.push(Fetch::Range(DateRangeQuery::new(
                    DateType::Checkin,
                    from,
                    to,
                    limit,
                )?));
            }
        }
        Ok(plan)
    }

    async fn fetch(&self, fetch: &Fetch) -> Result<Vec<RawReservation>, SyncError> {
        match fetch {
            Fetch::Updated { since } => {
                self.source
                    .fetch_updated_since(&self.property_id, *since, self.cfg.poll.fetch_limit)
                    .await
            }
            Fetch::Range(query) => {
                self.source
                    .fetch_by_date_range(&self.property_id, query)
                    .await
            }
        }
    }

    async fn advance_cursors(&self, cadence: Cadence, pass_start: DateTime<Utc>) -> Result<(), SyncError> {
        match cadence {
            Cadence::Continuous => {
                let overlap = Duration::from_std(self.cfg.poll.cursor_overlap).unwrap_or(Duration::zero());
                let next = pass_start
                    .checked_sub_signed(overlap)
                    .unwrap_or(pass_start)
                    .timestamp();
                let next = self.timestamps.validate(Some(next), CursorField::LastUpdateCheck.key());
                self.state.set_cursor(CursorField::LastUpdateCheck, next).await?;
                self.state
                    .set_cursor(CursorField::LastContinuousCheck, pass_start.timestamp())
                    .await
            }
            Cadence::DeepCheck => {
                self.state
                    .set_cursor(CursorField::LastDeepCheck, pass_start.timestamp())
                    .await
            }
        }
    }

    /// Process `records` in order until done or `deadline` passes. Returns `false` on overrun.
    async fn process_batch(
        &self,
        records: &[RawReservation],
        deadline: Instant,
        report: &mut PassReport,
    ) -> bool {
        for (i, raw) in records.iter().enumerate() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    processed = i,
                    remaining = records.len() - i,
                    "batch budget exhausted; continuation needed"
                );
                report.continuation_needed = true;
                return false;
            }
            match self.process_one(raw).await {
                Ok(outcome) => report.tally(&outcome),
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(error = %e, "reservation processing failed");
                }
            }
        }
        true
    }

    async fn process_one(&self, raw: &RawReservation) -> Result<ItemOutcome, SyncError> {
        if let ProcessDecision::Skip(reason) = self.dedup.should_process(raw).await? {
            tracing::debug!(reason = reason.as_str(), "reservation skipped");
            return Ok(ItemOutcome::Skipped(reason));
        }
        let aliases = DedupStore::collect_alias_ids(raw);
        let Some(primary) = aliases.first() else {
            return Ok(ItemOutcome::Skipped(SkipReason::NoIdentifier));
        };

        let Some(locks) = self
            .locks
            .try_acquire_all(reservation_keys(&aliases), self.cfg.poll.reservation_lock_ttl)
            .await?
        else {
            tracing::info!(
                reservation = %primary,
                aliases = aliases.len(),
                "reservation locked elsewhere; skipped as concurrent"
            );
            return Ok(ItemOutcome::Concurrent);
        };
        let result = self.process_locked(raw).await;
        self.locks.release_all(locks).await;
        result
    }

    async fn process_locked(&self, raw: &RawReservation) -> Result<ItemOutcome, SyncError> {
        // The other path may have finished between the first check and the lock.
        let decision = self.dedup.should_process(raw).await?;
        if let ProcessDecision::Skip(reason) = decision {
            return Ok(ItemOutcome::Skipped(reason));
        }
        if let ProcessDecision::StatusUpdate { previous, current } = &decision {
            tracing::info!(previous = %previous, current = %current, "presence changed; dispatching status update");
        }

        let Some((reservation, tracking)) = self.transformer.transform(raw) else {
            return Ok(ItemOutcome::Skipped(SkipReason::MissingDates));
        };
        let result = self.dispatcher.dispatch(&reservation, &tracking).await?;
        let aliases: Vec<String> = reservation.alias_ids.iter().cloned().collect();

        // A queued retry for a sink delivered just now must not fire again.
        let delivered: Vec<&str> = result
            .integrations
            .iter()
            .filter(|(_, o)| o.status == SinkStatus::Success)
            .map(|(name, _)| name.as_str())
            .collect();
        if !delivered.is_empty() {
            self.retry.settle(&aliases, &delivered).await?;
        }

        if result.should_mark_processed {
            self.dedup
                .mark_processed(&aliases, &reservation.id, &reservation.presence)
                .await?;
        }
        let failures = result.retryable_failures();
        if !failures.is_empty() {
            let payload = RetryPayload {
                reservation: reservation.clone(),
                tracking,
            };
            self.retry
                .enqueue(&reservation.id, &failures, &payload, self.cfg.retry.retry_delay)
                .await?;
        }
        Ok(ItemOutcome::Dispatched(result))
    }
}
