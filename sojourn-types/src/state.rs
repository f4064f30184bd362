//! Persisted engine state: poll cursors, circuit state and dedup records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reservation::Presence;

/// Registry of cursor timestamps, one per polling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorField {
    /// Start of the most recent continuous pass.
    LastContinuousCheck,
    /// `updated_after` cursor for the delta endpoint.
    LastUpdateCheck,
    /// Start of the most recent deep-check pass.
    LastDeepCheck,
}

impl CursorField {
    /// Every known cursor.
    pub const ALL: [Self; 3] = [
        Self::LastContinuousCheck,
        Self::LastUpdateCheck,
        Self::LastDeepCheck,
    ];

    /// Stable storage key.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::LastContinuousCheck => "last_continuous_check",
            Self::LastUpdateCheck => "last_update_check",
            Self::LastDeepCheck => "last_deep_check",
        }
    }
}

impl fmt::Display for CursorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Open circuit: polling is paused until `until`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitState {
    /// Polling resumes at this instant.
    pub until: DateTime<Utc>,
    /// When the circuit opened.
    pub opened_at: DateTime<Utc>,
    /// Last error that tripped the breaker.
    pub reason: String,
}

/// Record of a reservation alias that has been dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupRecord {
    /// Canonical id of the reservation this alias belongs to.
    pub canonical_id: String,
    /// Last time the reservation was dispatched or refreshed.
    pub processed_at: DateTime<Utc>,
    /// Presence at that time.
    pub last_presence: Presence,
}
