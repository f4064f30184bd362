//! Raw and canonical reservation records plus upstream query shapes.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SyncError;

/// Heterogeneous reservation record exactly as received upstream.
///
/// Field names vary by vendor and API version, so the record is kept as an
/// ordered key/value map. The transformer is the only place that interprets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawReservation(Map<String, Value>);

impl RawReservation {
    /// Wrap an already-parsed JSON object.
    #[must_use]
    pub const fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Exact-key lookup.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Case-insensitive key lookup; exact matches win.
    #[must_use]
    pub fn get_ci(&self, key: &str) -> Option<&Value> {
        self.0.get(key).or_else(|| {
            self.0
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }

    /// Iterate fields in upstream order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Borrow the underlying map.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Number of top-level fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the record has no fields at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Insert or replace a field (used by fixtures and tests).
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }
}

impl From<Map<String, Value>> for RawReservation {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for RawReservation {
    type Error = SyncError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(SyncError::Protocol(format!(
                "reservation entry is not an object: {other}"
            ))),
        }
    }
}

/// Guest presence status as reported by the property-management system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    /// No presence information yet.
    #[default]
    Unset,
    /// Guest checked in.
    Arrived,
    /// Guest checked out.
    Departed,
    /// Guest never showed up.
    NoShow,
    /// Any vendor value not covered above.
    Other(String),
}

impl Presence {
    /// Parse a vendor presence value. Unknown values are kept verbatim.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let v = raw.trim().to_ascii_lowercase();
        match v.as_str() {
            "" | "0" | "none" | "null" | "unset" | "expected" => Self::Unset,
            "arrived" | "checked_in" | "checkedin" | "check_in" | "checkin" | "in_house"
            | "inhouse" | "1" => Self::Arrived,
            "departed" | "checked_out" | "checkedout" | "check_out" | "checkout" | "2" => {
                Self::Departed
            }
            "no_show" | "noshow" | "no-show" => Self::NoShow,
            _ => Self::Other(v),
        }
    }

    /// Whether this presence may turn a processed reservation into a status update.
    #[must_use]
    pub const fn is_status_change(&self) -> bool {
        matches!(self, Self::Arrived | Self::Departed)
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("unset"),
            Self::Arrived => f.write_str("arrived"),
            Self::Departed => f.write_str("departed"),
            Self::NoShow => f.write_str("no_show"),
            Self::Other(v) => f.write_str(v),
        }
    }
}

/// Normalized reservation handed to sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalReservation {
    /// Canonical dedup key.
    pub id: String,
    /// Every id-like value seen on the record; never empty after validation.
    pub alias_ids: BTreeSet<String>,
    /// Reported value after the net/gross policy; never negative.
    pub value: Decimal,
    /// Upper-case ISO 4217 code.
    pub currency: String,
    /// Guest first name, possibly empty.
    pub guest_first_name: String,
    /// Guest last name, possibly empty.
    pub guest_last_name: String,
    /// Guest email as received.
    pub email: Option<String>,
    /// Guest phone as received.
    pub phone: Option<String>,
    /// Two-letter lower-case language code.
    pub language: Option<String>,
    /// Arrival date.
    pub checkin: NaiveDate,
    /// Departure date.
    pub checkout: NaiveDate,
    /// Room or unit identifier.
    pub accommodation_id: String,
    /// Room or unit display name.
    pub accommodation_name: String,
    /// Number of guests, at least one.
    pub guests: u32,
    /// Presence status.
    pub presence: Presence,
    /// Tracking-correlation id extracted from nested sub-fields.
    pub session_id: Option<String>,
    /// Gross price before the net-value policy.
    pub raw_value: Decimal,
    /// Outstanding balance reported upstream.
    pub unpaid_balance: Decimal,
}

impl CanonicalReservation {
    /// Number of nights between check-in and check-out.
    #[must_use]
    pub fn nights(&self) -> i64 {
        (self.checkout - self.checkin).num_days().max(0)
    }
}

/// Click and session identifiers forwarded to analytics/ad sinks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingIds {
    /// Web-analytics session id.
    pub session_id: Option<String>,
    /// Google Ads click id.
    pub gclid: Option<String>,
    /// Meta click id.
    pub fbclid: Option<String>,
}

impl TrackingIds {
    /// True when no identifier was found.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.session_id.is_none() && self.gclid.is_none() && self.fbclid.is_none()
    }
}

/// Which stay date a date-range query filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateType {
    /// Filter on arrival date.
    Checkin,
    /// Filter on departure date.
    Checkout,
    /// Reservations in house on the given dates.
    Presence,
}

impl DateType {
    /// Upstream query value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Checkin => "checkin",
            Self::Checkout => "checkout",
            Self::Presence => "presence",
        }
    }
}

impl fmt::Display for DateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "checkin" => Ok(Self::Checkin),
            "checkout" => Ok(Self::Checkout),
            "presence" => Ok(Self::Presence),
            other => Err(SyncError::Validation(format!(
                "date_type must be one of checkin, checkout, presence (got {other:?})"
            ))),
        }
    }
}

/// Date-range listing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRangeQuery {
    /// Which date the range applies to.
    pub date_type: DateType,
    /// Inclusive start date.
    pub from: NaiveDate,
    /// Inclusive end date.
    pub to: NaiveDate,
    /// Optional page size.
    pub limit: Option<u32>,
}

impl DateRangeQuery {
    /// Build a query, rejecting inverted ranges.
    ///
    /// # Errors
    /// Returns `SyncError::Validation` when `from` is after `to`.
    pub fn new(
        date_type: DateType,
        from: NaiveDate,
        to: NaiveDate,
        limit: Option<u32>,
    ) -> Result<Self, SyncError> {
        if from > to {
            return Err(SyncError::Validation(format!(
                "from_date {from} is after to_date {to}"
            )));
        }
        Ok(Self {
            date_type,
            from,
            to,
            limit,
        })
    }
}
