//! Upstream status mapping and response envelope normalization.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::StatusCode;
use serde_json::Value;
use sojourn_types::{RawReservation, SyncError};

const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

static TOO_OLD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(too\s+old|older\s+than|too\s+far\s+in\s+the\s+past|max(imum)?\s+\d+\s+days|updated_after.*(invalid|range))")
        .expect("TOO_OLD_RE is a valid regex pattern")
});

/// Which upstream listing an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `/reservations/{property}`
    DateRange,
    /// `/reservations_updates/{property}`
    Updates,
}

impl Endpoint {
    /// Path segment.
    #[must_use]
    pub const fn segment(self) -> &'static str {
        match self {
            Self::DateRange => "reservations",
            Self::Updates => "reservations_updates",
        }
    }
}

/// Map a non-success status to the error taxonomy.
///
/// A 400 from the updates endpoint is always treated as a rejected cursor.
/// The vendor does not document a distinct code for that case, so this is a
/// heuristic; on other endpoints only bodies that say so are classified that way.
#[must_use]
pub fn classify_status(
    status: StatusCode,
    body: &str,
    endpoint: Endpoint,
    retry_after: Option<u64>,
) -> SyncError {
    let snippet = snippet(body);
    match status.as_u16() {
        400 if endpoint == Endpoint::Updates || TOO_OLD_RE.is_match(body) => {
            SyncError::TimestampTooOld(snippet)
        }
        400 => SyncError::BadRequest(snippet),
        401 => SyncError::Auth(format!("upstream rejected credentials: {snippet}")),
        403 => SyncError::Forbidden(format!("property access denied: {snippet}")),
        404 => SyncError::not_found(format!("{} endpoint", endpoint.segment())),
        429 => SyncError::rate_limited(
            "upstream",
            retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        ),
        code => SyncError::Upstream(format!("HTTP {code}: {snippet}")),
    }
}

/// Parse a `Retry-After` header given in seconds.
#[must_use]
pub fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn snippet(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "<empty body>".to_string();
    }
    body.chars().take(200).collect()
}

fn truthy(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Normalize a successful response body into raw reservations.
///
/// Accepts a bare array or `{success, error?, reservations}`.
///
/// # Errors
/// `Protocol` for empty or malformed bodies, `Upstream` when the envelope
/// reports `success: false`.
pub fn parse_envelope(body: &str) -> Result<Vec<RawReservation>, SyncError> {
    if body.trim().is_empty() {
        return Err(SyncError::Protocol("empty response body".into()));
    }
    let value: Value = serde_json::from_str(body)
        .map_err(|e| SyncError::Protocol(format!("invalid JSON: {e}")))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            let success = map.get("success").and_then(truthy).unwrap_or(true);
            if !success {
                let message = map
                    .get("error")
                    .or_else(|| map.get("message"))
                    .map(|e| match e {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| "upstream reported failure".to_string());
                return Err(SyncError::Upstream(message));
            }
            match map.remove("reservations") {
                Some(Value::Array(items)) => items,
                None | Some(Value::Null) => Vec::new(),
                Some(other) => {
                    return Err(SyncError::Protocol(format!(
                        "reservations is not an array: {other}"
                    )));
                }
            }
        }
        other => {
            return Err(SyncError::Protocol(format!(
                "unexpected response shape: {other}"
            )));
        }
    };

    let total = items.len();
    let out: Vec<RawReservation> = items
        .into_iter()
        .filter_map(|item| RawReservation::try_from(item).ok())
        .collect();
    if out.len() < total {
        tracing::warn!(dropped = total - out.len(), "dropped non-object reservation entries");
    }
    Ok(out)
}
