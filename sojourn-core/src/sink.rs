//! Downstream destinations for canonical reservations.

use async_trait::async_trait;
use bitflags::bitflags;

use sojourn_types::{CanonicalReservation, SendOutcome, TrackingIds};

bitflags! {
    /// Behavioural tags the dispatcher uses to decide whether a sink applies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SinkCapabilities: u8 {
        /// Fires once per reservation; never on status updates.
        const ONE_TIME       = 0b0000_0001;
        /// Needs a syntactically valid guest email.
        const REQUIRES_EMAIL = 0b0000_0010;
        /// Real-time event; needs realtime sync and a polling-capable mode.
        const REALTIME_EVENT = 0b0000_0100;
    }
}

/// Well-known sink names.
pub mod names {
    /// Web-analytics purchase event.
    pub const GA4: &str = "ga4";
    /// Ads conversion event.
    pub const META: &str = "meta";
    /// Tag-manager data layer push.
    pub const GTM: &str = "gtm";
    /// Operator notification email.
    pub const ADMIN_NOTIFICATION: &str = "admin_notification";
    /// Marketing contact upsert.
    pub const BREVO_CONTACT: &str = "brevo_contact";
    /// Marketing automation event.
    pub const BREVO_EVENT: &str = "brevo_event";
}

/// Default capability set for a well-known sink name.
#[must_use]
pub fn default_capabilities(name: &str) -> SinkCapabilities {
    match name {
        names::GA4 | names::META | names::GTM | names::ADMIN_NOTIFICATION => {
            SinkCapabilities::ONE_TIME
        }
        names::BREVO_CONTACT => SinkCapabilities::REQUIRES_EMAIL,
        names::BREVO_EVENT => SinkCapabilities::REALTIME_EVENT | SinkCapabilities::REQUIRES_EMAIL,
        _ => SinkCapabilities::empty(),
    }
}

/// A downstream destination.
///
/// `send` reports failures through [`SendOutcome`] rather than an error so
/// one sink can never abort dispatch to the others.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Stable name, also the key in dispatch results and sink toggles.
    fn name(&self) -> &str;

    /// Behavioural tags.
    fn capabilities(&self) -> SinkCapabilities;

    /// Whether the sink has the credentials it needs.
    fn is_configured(&self) -> bool {
        true
    }

    /// Deliver one reservation.
    async fn send(
        &self,
        reservation: &CanonicalReservation,
        tracking: &TrackingIds,
    ) -> SendOutcome;
}
