//! Persistent retry queue records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reservation::{CanonicalReservation, TrackingIds};

/// Lifecycle state of a [`RetryItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryState {
    /// Waiting for `next_attempt_at`.
    Queued,
    /// Claimed by a worker pass.
    Processing,
    /// Last attempt failed; kept for inspection while a decision is pending.
    Failed,
    /// Gave up; never re-queued.
    PermanentFailure,
    /// Delivered; never re-queued.
    Completed,
}

impl RetryState {
    /// Terminal states are never mutated again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::PermanentFailure | Self::Completed)
    }
}

impl fmt::Display for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Failed => "failed",
            Self::PermanentFailure => "permanent_failure",
            Self::Completed => "completed",
        })
    }
}

/// Serialized body of a retry item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPayload {
    /// Reservation to resend.
    pub reservation: CanonicalReservation,
    /// Tracking ids extracted at first dispatch.
    pub tracking: TrackingIds,
}

/// One failed sink delivery awaiting another attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryItem {
    /// Store-assigned id.
    pub id: u64,
    /// Canonical reservation id.
    pub reservation_id: String,
    /// Sink to re-attempt.
    pub sink: String,
    /// Attempts made so far after the initial dispatch.
    pub attempt_count: u32,
    /// Serialized [`RetryPayload`]; `None` or undecodable means it cannot be retried.
    pub payload: Option<serde_json::Value>,
    /// Most recent failure message.
    pub last_error: Option<String>,
    /// Earliest time of the next attempt.
    pub next_attempt_at: DateTime<Utc>,
    /// Lifecycle state.
    pub state: RetryState,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl RetryItem {
    /// Decode the payload, if present and well-formed.
    ///
    /// # Errors
    /// Returns a description of why the payload cannot be used.
    pub fn decode_payload(&self) -> Result<RetryPayload, String> {
        let raw = self
            .payload
            .as_ref()
            .ok_or_else(|| "missing payload".to_string())?;
        serde_json::from_value(raw.clone()).map_err(|e| format!("corrupt payload: {e}"))
    }
}

/// Count of retry items per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryStats {
    /// Items in `Queued`.
    pub queued: usize,
    /// Items in `Processing`.
    pub processing: usize,
    /// Items in `Failed`.
    pub failed: usize,
    /// Items in `PermanentFailure`.
    pub permanent_failure: usize,
    /// Items in `Completed`.
    pub completed: usize,
}
