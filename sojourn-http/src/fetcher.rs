//! Reservation listing over the vendor REST API.

use async_trait::async_trait;
use sojourn_core::ReservationSource;
use sojourn_types::{Credentials, DateRangeQuery, RawReservation, SyncError};
use url::Url;

use crate::client::{BasicAuth, OutboundClient, transport};
use crate::response::{Endpoint, classify_status, parse_envelope, retry_after_secs};

/// [`ReservationSource`] backed by `GET /reservations*` endpoints with basic auth.
#[derive(Clone)]
pub struct HttpReservationFetcher {
    client: OutboundClient,
    credentials: Credentials,
}

struct Resolved<'a> {
    base: Url,
    auth: BasicAuth<'a>,
}

fn required<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str, SyncError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(SyncError::Config(format!("{what} is not configured"))),
    }
}

impl HttpReservationFetcher {
    /// Fetcher using `credentials` for every call.
    #[must_use]
    pub const fn new(client: OutboundClient, credentials: Credentials) -> Self {
        Self {
            client,
            credentials,
        }
    }

    fn resolve(&self) -> Result<Resolved<'_>, SyncError> {
        let base = required(self.credentials.base_url.as_deref(), "base_url")?;
        let username = required(self.credentials.username.as_deref(), "username")?;
        let password = required(self.credentials.password.as_deref(), "password")?;
        let base = Url::parse(base)
            .map_err(|e| SyncError::Config(format!("base_url {base:?} is invalid: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(SyncError::Config("base_url cannot be a base URL".into()));
        }
        Ok(Resolved {
            base,
            auth: BasicAuth { username, password },
        })
    }

    fn endpoint_url(base: &Url, endpoint: Endpoint, property_id: &str) -> Result<Url, SyncError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|()| SyncError::Config("base_url cannot be a base URL".into()))?
            .pop_if_empty()
            .push(endpoint.segment())
            .push(property_id);
        Ok(url)
    }

    async fn fetch(
        &self,
        endpoint: Endpoint,
        url: Url,
        auth: BasicAuth<'_>,
    ) -> Result<Vec<RawReservation>, SyncError> {
        tracing::debug!(endpoint = endpoint.segment(), url = %url, "fetching reservations");
        let resp = self.client.get(url, Some(auth)).await?;
        let status = resp.status();
        let retry_after = retry_after_secs(resp.headers());
        let body = resp.text().await.map_err(transport)?;

        if !status.is_success() {
            let err = classify_status(status, &body, endpoint, retry_after);
            tracing::warn!(endpoint = endpoint.segment(), status = status.as_u16(), error = %err, "upstream request failed");
            return Err(err);
        }
        let items = parse_envelope(&body)?;
        tracing::debug!(endpoint = endpoint.segment(), count = items.len(), "reservations fetched");
        Ok(items)
    }
}

#[async_trait]
impl ReservationSource for HttpReservationFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_by_date_range(
        &self,
        property_id: &str,
        query: &DateRangeQuery,
    ) -> Result<Vec<RawReservation>, SyncError> {
        let Resolved { base, auth } = self.resolve()?;
        let property_id = required(Some(property_id), "property_id")?;
        if query.from > query.to {
            return Err(SyncError::Validation(format!(
                "from_date {} is after to_date {}",
                query.from, query.to
            )));
        }
        let mut url = Self::endpoint_url(&base, Endpoint::DateRange, property_id)?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("date_type", query.date_type.as_str())
                .append_pair("from_date", &query.from.format("%Y-%m-%d").to_string())
                .append_pair("to_date", &query.to.format("%Y-%m-%d").to_string());
            if let Some(limit) = query.limit {
                q.append_pair("limit", &limit.to_string());
            }
        }
        self.fetch(Endpoint::DateRange, url, auth).await
    }

    async fn fetch_updated_since(
        &self,
        property_id: &str,
        since: i64,
        limit: Option<u32>,
    ) -> Result<Vec<RawReservation>, SyncError> {
        let Resolved { base, auth } = self.resolve()?;
        let property_id = required(Some(property_id), "property_id")?;
        let mut url = Self::endpoint_url(&base, Endpoint::Updates, property_id)?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("updated_after", &since.to_string());
            if let Some(limit) = limit {
                q.append_pair("limit", &limit.to_string());
            }
        }
        self.fetch(Endpoint::Updates, url, auth).await
    }
}
