//! Generic JSON webhook sink.

use async_trait::async_trait;
use serde::Serialize;
use sojourn_core::{Sink, SinkCapabilities};
use sojourn_types::{CanonicalReservation, SendOutcome, SyncError, TrackingIds};
use url::Url;

use crate::client::OutboundClient;

#[derive(Serialize)]
struct Envelope<'a> {
    sink: &'a str,
    reservation: &'a CanonicalReservation,
    tracking: &'a TrackingIds,
}

/// Sink that POSTs `{sink, reservation, tracking}` as JSON.
///
/// 2xx is success; 408, 429 and 5xx are retryable; any other status is permanent.
#[derive(Clone)]
pub struct HttpSink {
    name: String,
    capabilities: SinkCapabilities,
    endpoint: Option<Url>,
    bearer: Option<String>,
    client: OutboundClient,
}

impl HttpSink {
    /// Sink named `name` posting to `endpoint`. With no endpoint the sink reports itself unconfigured.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        capabilities: SinkCapabilities,
        endpoint: Option<Url>,
        client: OutboundClient,
    ) -> Self {
        Self {
            name: name.into(),
            capabilities,
            endpoint,
            bearer: None,
            client,
        }
    }

    /// Send `Authorization: Bearer <token>`.
    #[must_use]
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

#[async_trait]
impl Sink for HttpSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> SinkCapabilities {
        self.capabilities
    }

    fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    async fn send(
        &self,
        reservation: &CanonicalReservation,
        tracking: &TrackingIds,
    ) -> SendOutcome {
        let Some(url) = self.endpoint.clone() else {
            return SendOutcome::skipped("not configured");
        };
        let body = Envelope {
            sink: &self.name,
            reservation,
            tracking,
        };
        let resp = match self
            .client
            .post_json(url, &body, self.bearer.as_deref())
            .await
        {
            Ok(resp) => resp,
            Err(e @ (SyncError::RateLimited { .. } | SyncError::Transport(_))) => {
                return SendOutcome::retryable(e.to_string());
            }
            Err(e) => return SendOutcome::permanent(e.to_string()),
        };

        let status = resp.status();
        if status.is_success() {
            return SendOutcome::success();
        }
        let text = resp.text().await.unwrap_or_default();
        let message = format!("HTTP {}: {}", status.as_u16(), text.trim());
        tracing::warn!(sink = %self.name, status = status.as_u16(), "sink request failed");
        if status.is_server_error() || matches!(status.as_u16(), 408 | 429) {
            SendOutcome::retryable(message)
        } else {
            SendOutcome::permanent(message)
        }
    }
}
