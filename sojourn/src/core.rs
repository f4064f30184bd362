use std::sync::Arc;

use sojourn_core::{
    CircuitPolicy, CircuitState, Clock, ConnectionMode, DedupRepository, DedupStore,
    LockProvider, MemoryDedupRepository, MemoryLockProvider, MemoryRetryRepository,
    MemoryStateStore, ReservationSource, ReservationTransformer, RetryPolicy, RetryRepository,
    RetryStats, Sink, StateStore, SyncConfig, SyncError, SystemClock, TimestampGuard,
    TransformOptions,
};

use crate::circuit::CircuitBreaker;
use crate::dispatch::{DispatchPolicy, Dispatcher};
use crate::locks::{ConcurrencyGuard, RETRY_LOCK, RETRY_LOCK_TTL};
use crate::retry::{RetryQueue, RetryReport};

/// Reservation sync engine: polls a source, dedups, transforms and fans out to sinks.
///
/// Shared via `Arc`; every pass and [`ingest`](Engine::ingest) call may run
/// concurrently, with the poll and reservation locks keeping them consistent.
pub struct Engine {
    pub(crate) cfg: SyncConfig,
    pub(crate) property_id: String,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) source: Arc<dyn ReservationSource>,
    pub(crate) state: Arc<dyn StateStore>,
    pub(crate) timestamps: TimestampGuard,
    pub(crate) dedup: DedupStore,
    pub(crate) transformer: ReservationTransformer,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) retry: RetryQueue,
    pub(crate) circuit: CircuitBreaker,
    pub(crate) locks: ConcurrencyGuard,
}

/// Builder for an [`Engine`].
pub struct EngineBuilder {
    cfg: SyncConfig,
    source: Option<Arc<dyn ReservationSource>>,
    sinks: Vec<Arc<dyn Sink>>,
    clock: Option<Arc<dyn Clock>>,
    state: Option<Arc<dyn StateStore>>,
    dedup: Option<Arc<dyn DedupRepository>>,
    retry: Option<Arc<dyn RetryRepository>>,
    locks: Option<Arc<dyn LockProvider>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Create a builder with default configuration and no collaborators.
    ///
    /// Behavior and trade-offs:
    /// - A source and a property id are required; everything else has a default.
    /// - Persistence defaults to the in-memory stores, which lose cursors, dedup
    ///   records and queued retries on restart. Supply durable implementations
    ///   for production.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cfg: SyncConfig::default(),
            source: None,
            sinks: vec![],
            clock: None,
            state: None,
            dedup: None,
            retry: None,
            locks: None,
        }
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn with_config(mut self, cfg: SyncConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Set the upstream property id.
    #[must_use]
    pub fn property_id(mut self, id: impl Into<String>) -> Self {
        self.cfg.property_id = Some(id.into());
        self
    }

    /// Treat presence changes on processed reservations as status updates.
    ///
    /// Behavior and trade-offs:
    /// - Continuous passes also fetch today's in-house reservations, one more
    ///   upstream call per pass.
    /// - Status updates still reach repeatable sinks; one-time sinks skip them.
    #[must_use]
    pub const fn allow_status_updates(mut self, yes: bool) -> Self {
        self.cfg.allow_status_updates = yes;
        self
    }

    /// Report `price - unpaid balance` instead of the gross price.
    ///
    /// Behavior and trade-offs:
    /// - Fully unpaid bookings report a value of zero. Pair with
    ///   [`skip_zero_value_events`](Self::skip_zero_value_events) to keep them
    ///   out of purchase analytics.
    #[must_use]
    pub const fn use_net_value(mut self, yes: bool) -> Self {
        self.cfg.use_net_value = yes;
        self
    }

    /// Suppress one-time sinks for zero-value reservations.
    #[must_use]
    pub const fn skip_zero_value_events(mut self, yes: bool) -> Self {
        self.cfg.skip_zero_value_events = yes;
        self
    }

    /// Allow realtime event sinks to fire from the poller.
    #[must_use]
    pub const fn realtime_sync(mut self, yes: bool) -> Self {
        self.cfg.realtime_sync = yes;
        self
    }

    /// Select how reservation events reach the engine.
    ///
    /// Behavior and trade-offs:
    /// - `WebhookOnly` keeps realtime event sinks quiet on the poll path so the
    ///   webhook path does not fire them twice.
    #[must_use]
    pub const fn connection_mode(mut self, mode: ConnectionMode) -> Self {
        self.cfg.connection_mode = mode;
        self
    }

    /// Retry queue policy.
    #[must_use]
    pub const fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.cfg.retry = policy;
        self
    }

    /// Circuit breaker policy.
    #[must_use]
    pub const fn circuit_policy(mut self, policy: CircuitPolicy) -> Self {
        self.cfg.circuit = policy;
        self
    }

    /// Upstream reservation source.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn ReservationSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Register a sink. Dispatch visits sinks in registration order.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Wall clock; defaults to [`SystemClock`].
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Cursor, circuit and error-counter storage.
    #[must_use]
    pub fn with_state_store(mut self, state: Arc<dyn StateStore>) -> Self {
        self.state = Some(state);
        self
    }

    /// Dedup record storage.
    #[must_use]
    pub fn with_dedup_repository(mut self, repo: Arc<dyn DedupRepository>) -> Self {
        self.dedup = Some(repo);
        self
    }

    /// Retry item storage.
    #[must_use]
    pub fn with_retry_repository(mut self, repo: Arc<dyn RetryRepository>) -> Self {
        self.retry = Some(repo);
        self
    }

    /// Lock provider shared with any other ingestion path.
    #[must_use]
    pub fn with_lock_provider(mut self, locks: Arc<dyn LockProvider>) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    /// Returns `Config` when no source is registered or the property id is missing or blank.
    pub fn build(self) -> Result<Engine, SyncError> {
        let source = self.source.ok_or_else(|| {
            SyncError::Config("no reservation source; add one via with_source(...)".to_string())
        })?;
        let property_id = self
            .cfg
            .property_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SyncError::Config("property id is not set".to_string()))?
            .to_string();

        let cfg = self.cfg;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let state = self
            .state
            .unwrap_or_else(|| Arc::new(MemoryStateStore::new()));
        let dedup_repo = self
            .dedup
            .unwrap_or_else(|| Arc::new(MemoryDedupRepository::new()));
        let retry_repo = self
            .retry
            .unwrap_or_else(|| Arc::new(MemoryRetryRepository::new()));
        let locks = ConcurrencyGuard::new(
            self.locks
                .unwrap_or_else(|| Arc::new(MemoryLockProvider::new())),
        );

        let timestamps = TimestampGuard::new(Arc::clone(&clock), Arc::clone(&state), cfg.timestamps);
        let dedup = DedupStore::new(dedup_repo, Arc::clone(&clock), cfg.allow_status_updates);
        let dispatcher = Arc::new(Dispatcher::new(
            self.sinks,
            dedup.clone(),
            DispatchPolicy::from(&cfg),
        ));
        let retry = RetryQueue::new(
            retry_repo,
            Arc::clone(&dispatcher),
            dedup.clone(),
            locks.clone(),
            Arc::clone(&clock),
            cfg.retry.batch_size,
            cfg.poll.reservation_lock_ttl,
        );
        let circuit = CircuitBreaker::new(
            Arc::clone(&state),
            timestamps.clone(),
            Arc::clone(&clock),
            cfg.circuit,
        );

        tracing::debug!(
            source = source.name(),
            sinks = ?dispatcher.sink_names().collect::<Vec<_>>(),
            property = %property_id,
            "engine built"
        );

        Ok(Engine {
            transformer: ReservationTransformer::new(TransformOptions::from(&cfg)),
            cfg,
            property_id,
            clock,
            source,
            state,
            timestamps,
            dedup,
            dispatcher,
            retry,
            circuit,
            locks,
        })
    }
}

impl Engine {
    /// Start building an engine.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.cfg
    }

    /// Shared dedup store, for ingestion paths that want to check before calling [`ingest`](Self::ingest).
    #[must_use]
    pub const fn dedup(&self) -> &DedupStore {
        &self.dedup
    }

    /// Cursor validation rules in use.
    #[must_use]
    pub const fn timestamps(&self) -> &TimestampGuard {
        &self.timestamps
    }

    /// Persisted circuit state, if open or not yet cleared.
    ///
    /// # Errors
    /// Propagates state store failures.
    pub async fn circuit_state(&self) -> Result<Option<CircuitState>, SyncError> {
        self.circuit.status().await
    }

    /// Re-attempt due retry items. Skipped when another retry pass is running.
    ///
    /// # Errors
    /// Persistence failures.
    #[tracing::instrument(name = "sojourn::retry::run", skip(self))]
    pub async fn run_retries(&self) -> Result<RetryReport, SyncError> {
        let Some(lock) = self.locks.try_acquire(RETRY_LOCK, RETRY_LOCK_TTL).await? else {
            tracing::info!("retry pass already running; skipped");
            return Ok(RetryReport {
                lock_busy: true,
                ..RetryReport::default()
            });
        };
        let result = self
            .retry
            .retry_due(self.cfg.retry.max_attempts, self.cfg.retry.retry_delay)
            .await;
        self.locks.release(lock).await;
        result
    }

    /// Retry item counts per state.
    ///
    /// # Errors
    /// Persistence failures.
    pub async fn retry_stats(&self) -> Result<RetryStats, SyncError> {
        self.retry.stats().await
    }

    /// Move every cursor to the reset position and close the circuit.
    ///
    /// Returns the new cursor value (Unix seconds).
    ///
    /// # Errors
    /// Persistence failures.
    #[tracing::instrument(name = "sojourn::emergency_reset", skip(self))]
    pub async fn emergency_reset(&self, reason: &str) -> Result<i64, SyncError> {
        let cursor = self.timestamps.reset_all(reason).await?;
        self.circuit.reset().await?;
        tracing::warn!(reason, cursor, "emergency reset performed");
        Ok(cursor)
    }
}
