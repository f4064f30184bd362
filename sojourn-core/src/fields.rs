//! Field-name aliases and scalar coercions for heterogeneous reservation records.
//!
//! Upstream vendors disagree on naming, so every logical field is looked up
//! through an ordered alias list; the first non-empty value wins.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;

use sojourn_types::RawReservation;

/// Id-bearing fields, highest priority first.
pub const ID_FIELDS: &[&str] = &[
    "id",
    "reservation_id",
    "booking_id",
    "id_reservation",
    "reservation_code",
    "booking_code",
    "code",
    "internal_id",
    "external_id",
    "ota_id",
    "channel_reservation_id",
    "confirmation_number",
    "uid",
];

pub(crate) const FIRST_NAME_FIELDS: &[&str] = &[
    "first_name",
    "firstname",
    "guest_first_name",
    "customer_first_name",
    "name_first",
];
pub(crate) const LAST_NAME_FIELDS: &[&str] = &[
    "last_name",
    "lastname",
    "surname",
    "guest_last_name",
    "customer_last_name",
    "name_last",
];
pub(crate) const FULL_NAME_FIELDS: &[&str] = &["guest_name", "customer_name", "name", "guest"];
pub(crate) const EMAIL_FIELDS: &[&str] = &["email", "guest_email", "customer_email", "mail"];
pub(crate) const PHONE_FIELDS: &[&str] = &[
    "phone",
    "telephone",
    "mobile",
    "guest_phone",
    "customer_phone",
    "cellphone",
];
pub(crate) const CHECKIN_FIELDS: &[&str] = &[
    "from_date",
    "checkin",
    "check_in",
    "checkin_date",
    "arrival",
    "arrival_date",
    "date_from",
    "start_date",
];
pub(crate) const CHECKOUT_FIELDS: &[&str] = &[
    "to_date",
    "checkout",
    "check_out",
    "checkout_date",
    "departure",
    "departure_date",
    "date_to",
    "end_date",
];
pub(crate) const PRICE_FIELDS: &[&str] = &[
    "price",
    "total_price",
    "total",
    "amount",
    "total_amount",
    "value",
    "revenue",
];
pub(crate) const UNPAID_FIELDS: &[&str] = &[
    "unpaid_balance",
    "balance",
    "balance_due",
    "amount_due",
    "unpaid",
];
pub(crate) const GUEST_COUNT_FIELDS: &[&str] = &[
    "guests",
    "guests_count",
    "number_of_guests",
    "pax",
    "adults",
    "persons",
];
pub(crate) const LANGUAGE_FIELDS: &[&str] = &["language", "lang", "lingua", "locale"];
pub(crate) const CURRENCY_FIELDS: &[&str] = &["currency", "currency_code", "currencycode", "valuta"];
pub(crate) const ACCOMMODATION_ID_FIELDS: &[&str] = &[
    "accommodation_id",
    "room_id",
    "unit_id",
    "room_type_id",
    "property_unit_id",
];
pub(crate) const ACCOMMODATION_NAME_FIELDS: &[&str] = &[
    "accommodation_name",
    "accommodation",
    "room_name",
    "room",
    "unit_name",
    "room_type",
];
pub(crate) const PRESENCE_FIELDS: &[&str] = &[
    "presence",
    "presence_status",
    "guest_status",
    "checkin_status",
    "status",
];

/// Keys that carry a web-analytics session id.
pub const SESSION_ID_KEYS: &[&str] = &[
    "sid",
    "session_id",
    "sessionid",
    "_sid",
    "ga_session_id",
    "tracking_sid",
];
/// Keys that carry a Google Ads click id.
pub const GCLID_KEYS: &[&str] = &["gclid"];
/// Keys that carry a Meta click id.
pub const FBCLID_KEYS: &[&str] = &["fbclid", "fbc"];

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]{2,}$").expect("EMAIL_RE is a valid regex pattern")
});

static CURRENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([a-z]{3})\b").expect("CURRENCY_RE is a valid regex pattern")
});

/// Render a scalar as a trimmed string. Integral numbers never carry a fraction.
#[must_use]
pub fn scalar_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                        format!("{f:.0}")
                    }
                    Some(f) if f.is_finite() => f.to_string(),
                    _ => return None,
                }
            }
        }
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// First non-empty scalar among `keys` (case-insensitive).
#[must_use]
pub fn first_string(raw: &RawReservation, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| raw.get_ci(k))
        .find_map(scalar_string)
}

/// First value among `keys` that parses as a date.
#[must_use]
pub fn first_date(raw: &RawReservation, keys: &[&str]) -> Option<NaiveDate> {
    keys.iter()
        .filter_map(|k| raw.get_ci(k))
        .filter_map(scalar_string)
        .find_map(|s| parse_date(&s))
}

/// Whether both stay dates are present and parseable.
#[must_use]
pub fn has_stay_dates(raw: &RawReservation) -> bool {
    first_date(raw, CHECKIN_FIELDS).is_some() && first_date(raw, CHECKOUT_FIELDS).is_some()
}

/// Parse `YYYY-MM-DD` (optionally followed by a time part) or `DD/MM/YYYY`.
#[must_use]
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Some(head) = s.get(..10)
        && let Ok(d) = NaiveDate::parse_from_str(head, "%Y-%m-%d")
    {
        return Some(d);
    }
    NaiveDate::parse_from_str(s, "%d/%m/%Y").ok()
}

/// Locale-tolerant decimal parse.
///
/// Accepts `1.234,56`, `1,234.56`, `1234,56` and `€ 99`. When both separators
/// appear the last one is the decimal point; a lone comma is a decimal point
/// unless it repeats, in which case every separator is a thousands mark.
#[must_use]
pub fn parse_decimal(input: &str) -> Option<Decimal> {
    let cleaned: String = input
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if !cleaned.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    let commas = cleaned.matches(',').count();
    let dots = cleaned.matches('.').count();
    let normalized = match (commas, dots) {
        (0, 0 | 1) => cleaned,
        (0, _) => cleaned.replace('.', ""),
        (1, 0) => cleaned.replace(',', "."),
        (_, 0) => cleaned.replace(',', ""),
        _ => {
            let last_comma = cleaned.rfind(',').unwrap_or(0);
            let last_dot = cleaned.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                cleaned.replace('.', "").replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
    };
    normalized.parse::<Decimal>().ok()
}

/// Decimal from a JSON value of either number or string shape.
#[must_use]
pub fn decimal_of(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n
            .to_string()
            .parse::<Decimal>()
            .ok()
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

/// First parseable decimal among `keys`.
#[must_use]
pub fn first_decimal(raw: &RawReservation, keys: &[&str]) -> Option<Decimal> {
    keys.iter()
        .filter_map(|k| raw.get_ci(k))
        .find_map(decimal_of)
}

/// Loose syntactic email check.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// Extract a three-letter currency code, upper-cased.
#[must_use]
pub fn extract_currency(s: &str) -> Option<String> {
    CURRENCY_RE
        .captures(s)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_uppercase())
}
