//! Upstream reservation listing.

use async_trait::async_trait;

use crate::SyncError;
use sojourn_types::{DateRangeQuery, RawReservation};

/// Lists reservations from the property-management system.
///
/// Result order is preserved as returned upstream.
#[async_trait]
pub trait ReservationSource: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Reservations whose `query.date_type` date falls in `[from, to]`.
    async fn fetch_by_date_range(
        &self,
        property_id: &str,
        query: &DateRangeQuery,
    ) -> Result<Vec<RawReservation>, SyncError>;

    /// Reservations modified after `since` (Unix seconds).
    async fn fetch_updated_since(
        &self,
        property_id: &str,
        since: i64,
        limit: Option<u32>,
    ) -> Result<Vec<RawReservation>, SyncError>;
}
