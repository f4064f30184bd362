//! sojourn
//!
//! Reservation synchronization engine. Polls a property-management API on two
//! cadences, drops reservations it has already dispatched (under any of their
//! alias ids), normalizes the rest and fans them out to analytics, ads and CRM
//! sinks. Failed sink deliveries go to a durable retry queue, and repeated
//! upstream failures open a circuit breaker that pauses polling.
//!
//! Quick start:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sojourn::{Engine, SchedulerConfig};
//!
//! let engine = Arc::new(
//!     Engine::builder()
//!         .property_id("1234")
//!         .with_source(source)
//!         .with_sink(ga4)
//!         .with_sink(brevo_contact)
//!         .build()?,
//! );
//! let scheduler = engine.spawn(SchedulerConfig::default());
//! // inbound webhook handler:
//! engine.ingest(&raw).await?;
//! ```
#![warn(missing_docs)]

mod circuit;
mod core;
mod dispatch;
mod locks;
mod poll;
mod retry;
mod scheduler;

pub use crate::circuit::{CircuitBreaker, CircuitCheck, ErrorVerdict};
pub use crate::core::{Engine, EngineBuilder};
pub use crate::dispatch::{DispatchPolicy, Dispatcher};
pub use crate::locks::{
    ConcurrencyGuard, HeldLock, HeldLocks, POLL_LOCK, RETRY_LOCK, reservation_key,
    reservation_keys,
};
pub use crate::poll::{Cadence, ItemOutcome, PassOutcome, PassReport};
pub use crate::retry::{RetryQueue, RetryReport};
pub use crate::scheduler::{SchedulerConfig, SchedulerHandle};

// Re-export core types for convenience
pub use sojourn_core::{
    CanonicalReservation, CircuitPolicy, CircuitState, Clock, ConnectionMode, Credentials,
    CursorField, DateRangeQuery, DateType, DedupRecord, DedupRepository, DedupStore, DispatchResult,
    DispatchStatus, HostBudget, LockProvider, LockToken, ManualClock, MemoryDedupRepository,
    MemoryLockProvider, MemoryRetryRepository, MemoryStateStore, PollPolicy, Presence,
    ProcessDecision, RateLimitConfig, RawReservation, ReservationSource, ReservationTransformer,
    RetryItem, RetryPayload, RetryPolicy, RetryRepository, RetryState, RetryStats, SendOutcome,
    Sink, SinkCapabilities, SinkOutcome, SinkStatus, SinkToggles, SkipReason, StateStore,
    SyncConfig, SyncError, SystemClock, TimestampGuard, TimestampPolicy, TrackingIds,
    TransformOptions,
};
