//! Error taxonomy shared across the workspace.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the sojourn workspace.
///
/// Covers local configuration and validation failures, the semantic mapping of
/// upstream HTTP statuses, malformed responses, persistence faults and sink
/// failures. Expected conditions (duplicates, busy locks, skipped sinks) are
/// never reported through this type.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SyncError {
    /// Required configuration (credentials, base URL, property id) is missing.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid input argument (unknown date type, inverted range, ...).
    #[error("invalid argument: {0}")]
    Validation(String),

    /// Upstream rejected the credentials (HTTP 401).
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Upstream denied access to the resource (HTTP 403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Upstream resource (property, endpoint) does not exist (HTTP 404).
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing resource, e.g. "property 42".
        what: String,
    },

    /// Upstream rejected the request parameters (HTTP 400, not timestamp related).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Upstream or local rate limiting; retry after the given delay.
    #[error("rate limited by {scope}: retry after {retry_after_secs}s")]
    RateLimited {
        /// Who limited the call: a destination host or "upstream".
        scope: String,
        /// Seconds until another attempt may succeed.
        retry_after_secs: u64,
    },

    /// The cursor timestamp is older than the upstream lookback limit.
    #[error("timestamp too old: {0}")]
    TimestampTooOld(String),

    /// 5xx status or a vendor-reported failure inside a 200 envelope.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Empty body, invalid JSON or an unexpected response shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Connection, TLS or timeout failure before a response was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// A persistence collaborator failed.
    #[error("store error: {0}")]
    Store(String),

    /// A downstream sink failed outside its normal outcome contract.
    #[error("{sink} failed: {message}")]
    Sink {
        /// Sink name.
        sink: String,
        /// Human-readable error message.
        message: String,
    },
}

impl SyncError {
    /// Helper: build a `NotFound` error for a description of the missing resource.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Helper: build a `RateLimited` error.
    pub fn rate_limited(scope: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::RateLimited {
            scope: scope.into(),
            retry_after_secs,
        }
    }

    /// Returns true if a later attempt of the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Upstream(_)
                | Self::Transport(_)
                | Self::Protocol(_)
                | Self::Store(_)
                | Self::Sink { .. }
        )
    }

    /// Returns true if this error counts toward the consecutive-error circuit breaker.
    ///
    /// Rate limiting, local configuration problems and the timestamp-too-old
    /// condition are handled on their own paths and never trip the breaker.
    #[must_use]
    pub const fn counts_toward_circuit(&self) -> bool {
        matches!(
            self,
            Self::Upstream(_)
                | Self::Protocol(_)
                | Self::Transport(_)
                | Self::BadRequest(_)
                | Self::Auth(_)
                | Self::Forbidden(_)
                | Self::NotFound { .. }
        )
    }

    /// Returns true for the recoverable timestamp-too-old condition.
    #[must_use]
    pub const fn is_timestamp_too_old(&self) -> bool {
        matches!(self, Self::TimestampTooOld(_))
    }
}
