//! Fan-out of one canonical reservation to every registered sink.

use std::collections::BTreeMap;
use std::sync::Arc;

use sojourn_core::fields::is_valid_email;
use sojourn_core::{
    CanonicalReservation, ConnectionMode, DedupStore, DispatchResult, Sink, SinkCapabilities,
    SinkOutcome, SinkToggles, SyncConfig, SyncError, TrackingIds,
};

/// Dispatch policy drawn from [`SyncConfig`].
#[derive(Debug, Clone, Default)]
pub struct DispatchPolicy {
    /// Per-sink toggles.
    pub sinks: SinkToggles,
    /// Suppress one-time sinks for zero-value bookings.
    pub skip_zero_value_events: bool,
    /// Realtime event sinks are allowed.
    pub realtime_sync: bool,
    /// Connection mode.
    pub connection_mode: ConnectionMode,
}

impl From<&SyncConfig> for DispatchPolicy {
    fn from(cfg: &SyncConfig) -> Self {
        Self {
            sinks: cfg.sinks.clone(),
            skip_zero_value_events: cfg.skip_zero_value_events,
            realtime_sync: cfg.realtime_sync,
            connection_mode: cfg.connection_mode,
        }
    }
}

/// Sends reservations to sinks and aggregates their outcomes.
pub struct Dispatcher {
    sinks: Vec<Arc<dyn Sink>>,
    dedup: DedupStore,
    policy: DispatchPolicy,
}

impl Dispatcher {
    /// Dispatcher over `sinks`, in registration order.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn Sink>>, dedup: DedupStore, policy: DispatchPolicy) -> Self {
        Self {
            sinks,
            dedup,
            policy,
        }
    }

    /// Registered sink by name.
    #[must_use]
    pub fn sink(&self, name: &str) -> Option<&Arc<dyn Sink>> {
        self.sinks.iter().find(|s| s.name() == name)
    }

    /// Names of every registered sink.
    pub fn sink_names(&self) -> impl Iterator<Item = &str> {
        self.sinks.iter().map(|s| s.name())
    }

    /// Why `sink` does not apply to this reservation, if it does not.
    fn skip_reason(
        &self,
        sink: &dyn Sink,
        reservation: &CanonicalReservation,
        is_status_update: bool,
    ) -> Option<&'static str> {
        let caps = sink.capabilities();
        if !self.policy.sinks.is_enabled(sink.name()) {
            return Some("disabled");
        }
        if !sink.is_configured() {
            return Some("not configured");
        }
        if caps.contains(SinkCapabilities::ONE_TIME) {
            if is_status_update {
                return Some("status update");
            }
            if self.policy.skip_zero_value_events && reservation.value.is_zero() {
                return Some("zero value");
            }
        }
        if caps.contains(SinkCapabilities::REQUIRES_EMAIL)
            && !reservation.email.as_deref().is_some_and(is_valid_email)
        {
            return Some("invalid or missing email");
        }
        if caps.contains(SinkCapabilities::REALTIME_EVENT) {
            if !self.policy.realtime_sync {
                return Some("realtime sync disabled");
            }
            if self.policy.connection_mode == ConnectionMode::WebhookOnly {
                return Some("webhook-only mode");
            }
        }
        None
    }

    /// Send `reservation` to every applicable sink.
    ///
    /// One sink failing never prevents the others from being attempted.
    ///
    /// # Errors
    /// Only dedup lookup failures; sink failures are reported in the result.
    pub async fn dispatch(
        &self,
        reservation: &CanonicalReservation,
        tracking: &TrackingIds,
    ) -> Result<DispatchResult, SyncError> {
        let aliases: Vec<String> = reservation.alias_ids.iter().cloned().collect();
        let is_status_update = self.dedup.is_processed(&aliases).await?;

        let mut outcomes = BTreeMap::new();
        for sink in &self.sinks {
            let outcome = match self.skip_reason(sink.as_ref(), reservation, is_status_update) {
                Some(reason) => SinkOutcome::skipped(reason),
                None => SinkOutcome::from_send(sink.send(reservation, tracking).await),
            };
            outcomes.insert(sink.name().to_string(), outcome);
        }

        let result = DispatchResult::from_outcomes(&reservation.id, outcomes, is_status_update);
        tracing::info!(
            reservation = %result.uid,
            status = %result.status,
            status_update = result.is_status_update,
            summary = %result.summary(),
            "dispatched"
        );
        Ok(result)
    }
}
