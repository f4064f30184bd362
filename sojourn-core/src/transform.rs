//! Normalization of heterogeneous raw records into [`CanonicalReservation`].

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::dedup::DedupStore;
use crate::fields::{
    self, ACCOMMODATION_ID_FIELDS, ACCOMMODATION_NAME_FIELDS, CHECKIN_FIELDS, CHECKOUT_FIELDS,
    CURRENCY_FIELDS, EMAIL_FIELDS, FIRST_NAME_FIELDS, FULL_NAME_FIELDS, GUEST_COUNT_FIELDS,
    LANGUAGE_FIELDS, LAST_NAME_FIELDS, PHONE_FIELDS, PRESENCE_FIELDS, PRICE_FIELDS, UNPAID_FIELDS,
};
use crate::tracking;
use sojourn_types::{CanonicalReservation, Presence, RawReservation, SyncConfig, TrackingIds};

const FALLBACK_CURRENCY: &str = "EUR";

/// Knobs that change how a raw record is interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOptions {
    /// Report `price - unpaid_balance` instead of `price`.
    pub use_net_value: bool,
    /// Currency used when the record carries none.
    pub default_currency: Option<String>,
}

impl From<&SyncConfig> for TransformOptions {
    fn from(cfg: &SyncConfig) -> Self {
        Self {
            use_net_value: cfg.use_net_value,
            default_currency: cfg.default_currency.clone(),
        }
    }
}

/// Pure mapping from raw upstream records to canonical reservations.
#[derive(Debug, Clone, Default)]
pub struct ReservationTransformer {
    options: TransformOptions,
}

impl ReservationTransformer {
    /// Build a transformer with the given options.
    #[must_use]
    pub const fn new(options: TransformOptions) -> Self {
        Self { options }
    }

    /// Options in effect.
    #[must_use]
    pub const fn options(&self) -> &TransformOptions {
        &self.options
    }

    /// Normalize `raw`. Returns `None` only when a stay date is missing.
    #[must_use]
    pub fn transform(&self, raw: &RawReservation) -> Option<(CanonicalReservation, TrackingIds)> {
        let checkin = fields::first_date(raw, CHECKIN_FIELDS)?;
        let checkout = fields::first_date(raw, CHECKOUT_FIELDS)?;

        let mut aliases = DedupStore::collect_alias_ids(raw);
        let id = match aliases.first() {
            Some(id) => id.clone(),
            None => {
                let fallback = raw
                    .iter()
                    .find_map(|(k, v)| fields::scalar_string(v).map(|s| (k.clone(), s)));
                let (key, id) = fallback?;
                tracing::warn!(field = %key, id = %id, "no id field on reservation; using first scalar field");
                aliases.push(id.clone());
                id
            }
        };

        let (first, last) = Self::names(raw);
        let raw_value = fields::first_decimal(raw, PRICE_FIELDS).unwrap_or_default();
        let unpaid = fields::first_decimal(raw, UNPAID_FIELDS).unwrap_or_default();
        let tracking = tracking::extract_tracking(raw);

        let canonical = CanonicalReservation {
            id,
            alias_ids: aliases.into_iter().collect::<BTreeSet<_>>(),
            value: self.net_value(raw_value, unpaid),
            currency: self.currency(raw),
            guest_first_name: first,
            guest_last_name: last,
            email: fields::first_string(raw, EMAIL_FIELDS),
            phone: fields::first_string(raw, PHONE_FIELDS),
            language: Self::language(raw),
            checkin,
            checkout,
            accommodation_id: fields::first_string(raw, ACCOMMODATION_ID_FIELDS)
                .unwrap_or_default(),
            accommodation_name: fields::first_string(raw, ACCOMMODATION_NAME_FIELDS)
                .unwrap_or_default(),
            guests: Self::guests(raw),
            presence: fields::first_string(raw, PRESENCE_FIELDS)
                .map(|p| Presence::parse(&p))
                .unwrap_or_default(),
            session_id: tracking.session_id.clone(),
            raw_value,
            unpaid_balance: unpaid,
        };
        Some((canonical, tracking))
    }

    fn net_value(&self, price: Decimal, unpaid: Decimal) -> Decimal {
        let value = if self.options.use_net_value && unpaid > Decimal::ZERO {
            price - unpaid
        } else {
            price
        };
        value.max(Decimal::ZERO)
    }

    fn currency(&self, raw: &RawReservation) -> String {
        let prioritized = CURRENCY_FIELDS
            .iter()
            .filter_map(|k| raw.get_ci(k))
            .filter_map(fields::scalar_string)
            .find_map(|s| fields::extract_currency(&s));
        if let Some(c) = prioritized {
            return c;
        }
        let loose = raw
            .iter()
            .filter(|(k, _)| k.to_ascii_lowercase().contains("currency"))
            .filter_map(|(_, v)| fields::scalar_string(v))
            .find_map(|s| fields::extract_currency(&s));
        loose
            .or_else(|| {
                self.options
                    .default_currency
                    .as_deref()
                    .and_then(fields::extract_currency)
            })
            .unwrap_or_else(|| FALLBACK_CURRENCY.to_string())
    }

    fn names(raw: &RawReservation) -> (String, String) {
        let first = fields::first_string(raw, FIRST_NAME_FIELDS);
        let last = fields::first_string(raw, LAST_NAME_FIELDS);
        if first.is_some() || last.is_some() {
            return (first.unwrap_or_default(), last.unwrap_or_default());
        }
        let Some(full) = fields::first_string(raw, FULL_NAME_FIELDS) else {
            return (String::new(), String::new());
        };
        match full.split_once(char::is_whitespace) {
            Some((f, l)) => (f.to_string(), l.trim().to_string()),
            None => (full, String::new()),
        }
    }

    fn guests(raw: &RawReservation) -> u32 {
        fields::first_decimal(raw, GUEST_COUNT_FIELDS)
            .and_then(|d| d.trunc().to_u32())
            .map_or(1, |n| n.max(1))
    }

    fn language(raw: &RawReservation) -> Option<String> {
        let lang = fields::first_string(raw, LANGUAGE_FIELDS)?.to_ascii_lowercase();
        (lang.chars().count() >= 2).then(|| lang.chars().take(2).collect())
    }
}
