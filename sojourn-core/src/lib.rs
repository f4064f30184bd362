//! sojourn-core
//!
//! Collaborator traits and the pure building blocks of the sync engine.
//!
//! - `store`: persistence traits (cursors, dedup, retry queue, locks) and
//!   `memory` implementations of each.
//! - `source` / `sink`: the upstream listing trait and the downstream sink trait.
//! - `timestamp`: cursor clamping.
//! - `dedup`, `transform`, `fields`, `tracking`: raw record interpretation.
//!
//! All async traits assume a Tokio 1.x runtime.
#![warn(missing_docs)]

/// Wall-clock abstraction.
pub mod clock;
pub mod dedup;
pub mod fields;
pub mod memory;
/// Downstream sink trait and capability flags.
pub mod sink;
pub mod source;
pub mod store;
pub mod timestamp;
pub mod tracking;
pub mod transform;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dedup::{DedupStore, ProcessDecision, SkipReason};
pub use memory::{
    MemoryDedupRepository, MemoryLockProvider, MemoryRetryRepository, MemoryStateStore,
};
pub use sink::{Sink, SinkCapabilities};
pub use source::ReservationSource;
pub use store::{DedupRepository, LockProvider, LockToken, RetryRepository, StateStore};
pub use timestamp::TimestampGuard;
pub use transform::{ReservationTransformer, TransformOptions};

pub use sojourn_types::*;
