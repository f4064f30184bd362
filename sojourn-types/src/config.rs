//! Configuration types read by the engine and its collaborators.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serde helper: `Duration` as whole seconds.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a duration as whole seconds.
    ///
    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    /// Deserialize a duration from whole seconds.
    ///
    /// # Errors
    /// Propagates deserializer errors.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// How reservation events reach the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ConnectionMode {
    /// Polling only.
    #[default]
    Polling,
    /// The inbound webhook handles realtime events; polling is a fallback.
    WebhookOnly,
    /// Both paths are active.
    Hybrid,
}

/// Basic-auth credentials and endpoint of the upstream reservation API.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Base URL, e.g. `https://api.example.com/v1`.
    pub base_url: Option<String>,
    /// Basic-auth user name.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Attempts allowed per window for one destination host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostBudget {
    /// Maximum attempts inside one window.
    pub max_attempts: u32,
    /// Length of the sliding window.
    #[serde(with = "duration_secs")]
    pub window: Duration,
}

/// Per-destination outbound budgets. Hosts without an entry are unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Budgets keyed by host name, matched case-insensitively.
    #[serde(default)]
    pub hosts: BTreeMap<String, HostBudget>,
}

impl RateLimitConfig {
    /// Add or replace a budget for `host`.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>, budget: HostBudget) -> Self {
        self.hosts.insert(host.into().to_ascii_lowercase(), budget);
        self
    }

    /// Budget for `host`, if one is configured.
    #[must_use]
    pub fn budget_for(&self, host: &str) -> Option<HostBudget> {
        self.hosts
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(host))
            .map(|(_, b)| *b)
    }
}

/// Feature toggles per sink name. Sinks without an entry are enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkToggles {
    /// Explicit on/off switches keyed by sink name.
    #[serde(default)]
    pub enabled: BTreeMap<String, bool>,
}

impl SinkToggles {
    /// Whether the sink named `name` may run.
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.get(name).copied().unwrap_or(true)
    }

    /// Set the toggle for `name`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, on: bool) -> Self {
        self.enabled.insert(name.into(), on);
        self
    }
}

/// Retry queue policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts after which an item becomes a permanent failure.
    pub max_attempts: u32,
    /// Delay between attempts.
    #[serde(with = "duration_secs")]
    pub retry_delay: Duration,
    /// Maximum items pulled per worker pass.
    pub batch_size: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_secs(15 * 60),
            batch_size: 25,
        }
    }
}

/// Consecutive-error circuit breaker policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitPolicy {
    /// Consecutive failing passes that open the circuit.
    pub error_threshold: u32,
    /// How long polling stays paused once open.
    #[serde(with = "duration_secs")]
    pub cooldown: Duration,
}

impl Default for CircuitPolicy {
    fn default() -> Self {
        Self {
            error_threshold: 3,
            cooldown: Duration::from_secs(300),
        }
    }
}

/// Window limits enforced on cursor timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampPolicy {
    /// Oldest accepted cursor, one day under the upstream's 7-day hard limit.
    #[serde(with = "duration_secs")]
    pub max_lookback: Duration,
    /// Furthest accepted cursor into the future.
    #[serde(with = "duration_secs")]
    pub max_lookahead: Duration,
    /// Cursor position after a reset.
    #[serde(with = "duration_secs")]
    pub reset_lookback: Duration,
}

impl Default for TimestampPolicy {
    fn default() -> Self {
        Self {
            max_lookback: Duration::from_secs(6 * 86_400),
            max_lookahead: Duration::from_secs(86_400),
            reset_lookback: Duration::from_secs(3 * 86_400),
        }
    }
}

/// Polling cadence knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Optional `limit` query parameter sent upstream.
    pub fetch_limit: Option<u32>,
    /// Wall-clock budget for one batch before a continuation is scheduled.
    #[serde(with = "duration_secs")]
    pub batch_budget: Duration,
    /// How far the delta cursor is moved back from the pass start.
    #[serde(with = "duration_secs")]
    pub cursor_overlap: Duration,
    /// Days covered by the deep-check pass.
    pub deep_lookback_days: u32,
    /// Poll lock expiry for continuous passes.
    #[serde(with = "duration_secs")]
    pub continuous_lock_ttl: Duration,
    /// Poll lock expiry for deep-check passes.
    #[serde(with = "duration_secs")]
    pub deep_lock_ttl: Duration,
    /// Per-reservation lock expiry.
    #[serde(with = "duration_secs")]
    pub reservation_lock_ttl: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            fetch_limit: None,
            batch_budget: Duration::from_secs(25),
            cursor_overlap: Duration::from_secs(60),
            deep_lookback_days: 6,
            continuous_lock_ttl: Duration::from_secs(120),
            deep_lock_ttl: Duration::from_secs(1800),
            reservation_lock_ttl: Duration::from_secs(60),
        }
    }
}

/// Everything the engine reads from the settings store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upstream endpoint and credentials.
    pub credentials: Credentials,
    /// Upstream property identifier.
    pub property_id: Option<String>,
    /// Treat arrived/departed changes on processed reservations as status updates.
    pub allow_status_updates: bool,
    /// Report `price - unpaid balance` instead of the gross price.
    pub use_net_value: bool,
    /// Fire realtime email-marketing events from the poller.
    pub realtime_sync: bool,
    /// How reservation events reach the engine.
    pub connection_mode: ConnectionMode,
    /// Currency used when a record carries none.
    pub default_currency: Option<String>,
    /// Suppress one-time sinks for reservations whose value is zero.
    pub skip_zero_value_events: bool,
    /// Per-sink feature toggles.
    pub sinks: SinkToggles,
    /// Per-host outbound budgets.
    pub rate_limits: RateLimitConfig,
    /// Retry queue policy.
    pub retry: RetryPolicy,
    /// Circuit breaker policy.
    pub circuit: CircuitPolicy,
    /// Cursor window limits.
    pub timestamps: TimestampPolicy,
    /// Polling knobs.
    pub poll: PollPolicy,
    /// Timeout applied to each upstream HTTP request.
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            property_id: None,
            allow_status_updates: false,
            use_net_value: false,
            realtime_sync: false,
            connection_mode: ConnectionMode::default(),
            default_currency: None,
            skip_zero_value_events: false,
            sinks: SinkToggles::default(),
            rate_limits: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            circuit: CircuitPolicy::default(),
            timestamps: TimestampPolicy::default(),
            poll: PollPolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}
