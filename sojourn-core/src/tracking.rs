//! Recursive search for tracking identifiers buried in nested sub-fields.
//!
//! Booking engines stash session and click ids in free-form fields: nested
//! objects, arrays, JSON encoded as a string, or query strings. The walk
//! descends through all of these up to [`MAX_DEPTH`] levels.

use serde_json::Value;
use url::form_urlencoded;

use crate::fields::{FBCLID_KEYS, GCLID_KEYS, SESSION_ID_KEYS, scalar_string};
use sojourn_types::{RawReservation, TrackingIds};

/// Nesting bound for the walk.
pub const MAX_DEPTH: usize = 32;

/// First non-empty scalar stored under any of `keys` (case-insensitive), searching depth-first.
#[must_use]
pub fn find_nested(value: &Value, keys: &[&str]) -> Option<String> {
    walk(value, keys, 0)
}

/// Extract session and click ids from a raw record.
#[must_use]
pub fn extract_tracking(raw: &RawReservation) -> TrackingIds {
    let root = Value::Object(raw.as_map().clone());
    TrackingIds {
        session_id: find_nested(&root, SESSION_ID_KEYS),
        gclid: find_nested(&root, GCLID_KEYS),
        fbclid: find_nested(&root, FBCLID_KEYS),
    }
}

fn key_matches(key: &str, keys: &[&str]) -> bool {
    keys.iter().any(|k| k.eq_ignore_ascii_case(key.trim()))
}

fn walk(value: &Value, keys: &[&str], depth: usize) -> Option<String> {
    if depth > MAX_DEPTH {
        return None;
    }
    match value {
        Value::Object(map) => {
            let direct = map
                .iter()
                .filter(|(k, _)| key_matches(k, keys))
                .find_map(|(_, v)| scalar_string(v));
            direct.or_else(|| map.values().find_map(|v| walk(v, keys, depth + 1)))
        }
        Value::Array(items) => items.iter().find_map(|v| walk(v, keys, depth + 1)),
        Value::String(s) => walk_text(s, keys, depth + 1),
        _ => None,
    }
}

fn walk_text(s: &str, keys: &[&str], depth: usize) -> Option<String> {
    let s = s.trim();
    if s.is_empty() || depth > MAX_DEPTH {
        return None;
    }
    if (s.starts_with('{') || s.starts_with('['))
        && let Ok(inner) = serde_json::from_str::<Value>(s)
    {
        return walk(&inner, keys, depth);
    }
    if s.contains('=') {
        let query = s.split_once('?').map_or(s, |(_, q)| q);
        for (k, v) in form_urlencoded::parse(query.as_bytes()) {
            if key_matches(&k, keys) {
                let v = v.trim();
                if !v.is_empty() {
                    return Some(v.to_string());
                }
            } else if let Some(found) = walk_text(&v, keys, depth + 1) {
                return Some(found);
            }
        }
        return None;
    }
    if s.contains('%') {
        let decoded: String = form_urlencoded::parse(format!("x={s}").as_bytes())
            .map(|(_, v)| v.into_owned())
            .next()?;
        if decoded != s {
            return walk_text(&decoded, keys, depth + 1);
        }
    }
    None
}
