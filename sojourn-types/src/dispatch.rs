//! Sink outcomes and aggregate dispatch results.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// What a sink reports back for a single `send` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    /// The sink accepted the reservation.
    pub success: bool,
    /// A later attempt may succeed.
    pub retryable: bool,
    /// The sink decided not to act (missing data, unsupported, ...).
    pub skipped: bool,
    /// Failure or skip reason.
    pub error: Option<String>,
}

impl SendOutcome {
    /// Successful delivery.
    #[must_use]
    pub const fn success() -> Self {
        Self {
            success: true,
            retryable: false,
            skipped: false,
            error: None,
        }
    }

    /// Failure that may succeed on retry.
    pub fn retryable(error: impl Into<String>) -> Self {
        Self {
            success: false,
            retryable: true,
            skipped: false,
            error: Some(error.into()),
        }
    }

    /// Failure that will not succeed on retry.
    pub fn permanent(error: impl Into<String>) -> Self {
        Self {
            success: false,
            retryable: false,
            skipped: false,
            error: Some(error.into()),
        }
    }

    /// The sink declined to act.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            retryable: false,
            skipped: true,
            error: Some(reason.into()),
        }
    }
}

/// Per-sink status recorded in a [`DispatchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkStatus {
    /// Delivered.
    Success,
    /// Attempted and failed.
    Failed,
    /// Not attempted or declined by the sink.
    Skipped,
}

impl fmt::Display for SinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        })
    }
}

/// Outcome of one sink for one reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkOutcome {
    /// Status.
    pub status: SinkStatus,
    /// Skip reason or failure message.
    pub note: Option<String>,
    /// Whether a failure may be retried.
    pub retryable: bool,
}

impl SinkOutcome {
    /// Outcome for a skipped sink.
    pub fn skipped(note: impl Into<String>) -> Self {
        Self {
            status: SinkStatus::Skipped,
            note: Some(note.into()),
            retryable: false,
        }
    }

    /// Lower a sink's [`SendOutcome`] into the recorded status.
    #[must_use]
    pub fn from_send(outcome: SendOutcome) -> Self {
        if outcome.success {
            Self {
                status: SinkStatus::Success,
                note: None,
                retryable: false,
            }
        } else if outcome.skipped {
            Self {
                status: SinkStatus::Skipped,
                note: outcome.error,
                retryable: false,
            }
        } else {
            Self {
                status: SinkStatus::Failed,
                note: outcome.error.or_else(|| Some("unknown error".to_string())),
                retryable: outcome.retryable,
            }
        }
    }
}

/// Aggregate status of a dispatch across all sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// No attempted sink failed.
    Success,
    /// At least one sink succeeded and at least one failed.
    Partial,
    /// No sink succeeded and at least one failed.
    Failed,
}

impl DispatchStatus {
    /// Compute the aggregate from success/failure counts.
    #[must_use]
    pub const fn aggregate(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (_, 0) => Self::Success,
            (0, _) => Self::Failed,
            _ => Self::Partial,
        }
    }
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        })
    }
}

/// Result of fanning one reservation out to every configured sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    /// Canonical reservation id.
    pub uid: String,
    /// Aggregate status.
    pub status: DispatchStatus,
    /// Outcome per sink name.
    pub integrations: BTreeMap<String, SinkOutcome>,
    /// Names of sinks that failed.
    pub failed_integrations: Vec<String>,
    /// Whether the reservation should be recorded as processed.
    pub should_mark_processed: bool,
    /// Whether one-time sinks were suppressed because the reservation was seen before.
    pub is_status_update: bool,
}

impl DispatchResult {
    /// Build a result from per-sink outcomes, computing the aggregate fields.
    #[must_use]
    pub fn from_outcomes(
        uid: impl Into<String>,
        integrations: BTreeMap<String, SinkOutcome>,
        is_status_update: bool,
    ) -> Self {
        let failed_integrations: Vec<String> = integrations
            .iter()
            .filter(|(_, o)| o.status == SinkStatus::Failed)
            .map(|(name, _)| name.clone())
            .collect();
        let succeeded = integrations
            .values()
            .filter(|o| o.status == SinkStatus::Success)
            .count();
        let status = DispatchStatus::aggregate(succeeded, failed_integrations.len());
        Self {
            uid: uid.into(),
            status,
            integrations,
            failed_integrations,
            should_mark_processed: matches!(
                status,
                DispatchStatus::Success | DispatchStatus::Partial
            ),
            is_status_update,
        }
    }

    /// Failed sinks whose failure may be retried, with their messages.
    #[must_use]
    pub fn retryable_failures(&self) -> Vec<(String, String)> {
        self.integrations
            .iter()
            .filter(|(_, o)| o.status == SinkStatus::Failed && o.retryable)
            .map(|(name, o)| (name.clone(), o.note.clone().unwrap_or_default()))
            .collect()
    }

    /// Human-readable per-sink summary, e.g. `ga4=success, meta=skipped (status update)`.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.integrations.is_empty() {
            return "no sinks configured".to_string();
        }
        self.integrations
            .iter()
            .map(|(name, o)| match &o.note {
                Some(note) => format!("{name}={} ({note})", o.status),
                None => format!("{name}={}", o.status),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
