use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use sojourn_core::sink::default_capabilities;
use sojourn_core::{
    CanonicalReservation, Presence, SendOutcome, Sink, SinkCapabilities, TrackingIds,
};

/// One recorded `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkCall {
    /// Canonical reservation id.
    pub reservation_id: String,
    /// Presence at send time.
    pub presence: Presence,
    /// Session id forwarded.
    pub session_id: Option<String>,
}

#[derive(Default)]
struct State {
    script: VecDeque<SendOutcome>,
    calls: Vec<SinkCall>,
}

/// Recording [`Sink`] with scripted outcomes; unscripted sends succeed.
#[derive(Clone)]
pub struct MockSink {
    name: String,
    capabilities: SinkCapabilities,
    configured: bool,
    delay: Option<Duration>,
    state: Arc<Mutex<State>>,
}

impl MockSink {
    /// Sink with the default capabilities for `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self::with_capabilities(name, default_capabilities(name))
    }

    /// Sink with explicit capabilities.
    #[must_use]
    pub fn with_capabilities(name: &str, capabilities: SinkCapabilities) -> Self {
        Self {
            name: name.to_string(),
            capabilities,
            configured: true,
            delay: None,
            state: Arc::default(),
        }
    }

    /// Report the sink as lacking credentials.
    #[must_use]
    pub const fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    /// Sleep this long inside every `send`.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the outcome of the next `send`.
    pub fn push_outcome(&self, outcome: SendOutcome) {
        self.state().script.push_back(outcome);
    }

    /// Queue the same outcome `n` times.
    pub fn push_outcomes(&self, outcome: &SendOutcome, n: usize) {
        let mut s = self.state();
        for _ in 0..n {
            s.script.push_back(outcome.clone());
        }
    }

    /// Every send so far.
    #[must_use]
    pub fn calls(&self) -> Vec<SinkCall> {
        self.state().calls.clone()
    }

    /// Number of sends so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }
}

#[async_trait]
impl Sink for MockSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> SinkCapabilities {
        self.capabilities
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn send(
        &self,
        reservation: &CanonicalReservation,
        tracking: &TrackingIds,
    ) -> SendOutcome {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let mut s = self.state();
        s.calls.push(SinkCall {
            reservation_id: reservation.id.clone(),
            presence: reservation.presence.clone(),
            session_id: tracking.session_id.clone(),
        });
        s.script.pop_front().unwrap_or_else(SendOutcome::success)
    }
}
