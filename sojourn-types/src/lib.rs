//! sojourn-types
//!
//! Serializable data transfer objects shared by every sojourn crate: the
//! error taxonomy, engine configuration, raw and canonical reservations,
//! dispatch outcomes, retry queue records and persisted engine state.
#![warn(missing_docs)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod reservation;
pub mod retry;
pub mod state;

pub use config::{
    CircuitPolicy, ConnectionMode, Credentials, HostBudget, PollPolicy, RateLimitConfig,
    RetryPolicy, SinkToggles, SyncConfig, TimestampPolicy,
};
pub use dispatch::{DispatchResult, DispatchStatus, SendOutcome, SinkOutcome, SinkStatus};
pub use error::SyncError;
pub use reservation::{
    CanonicalReservation, DateRangeQuery, DateType, Presence, RawReservation, TrackingIds,
};
pub use retry::{RetryItem, RetryPayload, RetryState, RetryStats};
pub use state::{CircuitState, CursorField, DedupRecord};
