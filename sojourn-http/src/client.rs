use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response};
use serde::Serialize;
use sojourn_middleware::Throttle;
use sojourn_types::SyncError;
use url::Url;

const USER_AGENT: &str = concat!("sojourn/", env!("CARGO_PKG_VERSION"));

/// Basic-auth pair.
#[derive(Clone, Copy)]
pub struct BasicAuth<'a> {
    /// User name.
    pub username: &'a str,
    /// Password.
    pub password: &'a str,
}

/// The single choke point for outbound HTTP.
///
/// Every request is admitted by the shared [`Throttle`] before it is sent.
#[derive(Clone)]
pub struct OutboundClient {
    http: Client,
    throttle: Arc<Throttle>,
}

impl OutboundClient {
    /// Build a client with the given per-request timeout.
    ///
    /// # Errors
    /// Returns `SyncError::Config` if the TLS backend cannot be initialised.
    pub fn new(throttle: Arc<Throttle>, timeout: Duration) -> Result<Self, SyncError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("http client: {e}")))?;
        Ok(Self { http, throttle })
    }

    /// Shared throttle.
    #[must_use]
    pub fn throttle(&self) -> &Arc<Throttle> {
        &self.throttle
    }

    /// `GET url` with optional basic auth.
    ///
    /// # Errors
    /// `RateLimited` when the host budget is spent, `Transport` on network failure or timeout.
    pub async fn get(&self, url: Url, auth: Option<BasicAuth<'_>>) -> Result<Response, SyncError> {
        self.throttle.admit(&url)?;
        let mut req = self.http.get(url);
        if let Some(a) = auth {
            req = req.basic_auth(a.username, Some(a.password));
        }
        req.send().await.map_err(transport)
    }

    /// `POST url` with a JSON body and optional bearer token.
    ///
    /// # Errors
    /// Same as [`get`](Self::get).
    pub async fn post_json<T: Serialize + Sync>(
        &self,
        url: Url,
        body: &T,
        bearer: Option<&str>,
    ) -> Result<Response, SyncError> {
        self.throttle.admit(&url)?;
        let mut req = self.http.post(url).json(body);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        req.send().await.map_err(transport)
    }
}

pub(crate) fn transport(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Transport(format!("request timed out: {e}"))
    } else {
        SyncError::Transport(e.to_string())
    }
}
