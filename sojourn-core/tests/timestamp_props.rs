use std::sync::Arc;

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use serde_json::json;
use sojourn_core::{
    Clock, CursorField, ManualClock, MemoryStateStore, StateStore, TimestampGuard, TimestampPolicy,
};

const NOW: i64 = 1_760_000_000;
const DAY: i64 = 86_400;

fn guard() -> (TimestampGuard, Arc<MemoryStateStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        DateTime::<Utc>::from_timestamp(NOW, 0).unwrap(),
    ));
    let state = Arc::new(MemoryStateStore::new());
    let g = TimestampGuard::new(clock.clone(), state.clone(), TimestampPolicy::default());
    (g, state, clock)
}

proptest! {
    #[test]
    fn validated_cursor_stays_in_window(ts in proptest::option::of(-4_000_000_000i64..4_000_000_000i64)) {
        let (g, _, _) = guard();
        let out = g.validate(ts, "prop");
        prop_assert!(out >= NOW - 6 * DAY);
        prop_assert!(out <= NOW + DAY);
    }

    #[test]
    fn validate_is_idempotent(ts in proptest::option::of(-4_000_000_000i64..4_000_000_000i64)) {
        let (g, _, _) = guard();
        let once = g.validate(ts, "prop");
        let twice = g.validate(Some(once), "prop");
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn in_window_values_pass_through(offset in 0i64..(7 * DAY)) {
        let (g, _, _) = guard();
        let ts = NOW - 6 * DAY + offset;
        prop_assert_eq!(g.validate(Some(ts), "prop"), ts);
    }
}

#[test]
fn clamp_rules() {
    let (g, _, _) = guard();
    assert_eq!(g.validate(None, "missing"), NOW - 2 * 3600);
    assert_eq!(g.validate(Some(NOW - 30 * DAY), "old"), NOW - 6 * DAY);
    assert_eq!(g.validate(Some(NOW + 3 * DAY), "future"), NOW - 3600);
    assert_eq!(g.validate(Some(-5), "negative"), NOW - 6 * DAY);
    assert_eq!(g.validate(Some(0), "epoch"), NOW - 6 * DAY);
}

#[test]
fn non_numeric_values_count_as_missing() {
    let (g, _, _) = guard();
    assert_eq!(g.validate_value(Some(&json!("yesterday")), "ctx"), NOW - 2 * 3600);
    assert_eq!(g.validate_value(Some(&json!(null)), "ctx"), NOW - 2 * 3600);
    assert_eq!(g.validate_value(None, "ctx"), NOW - 2 * 3600);
    assert_eq!(g.validate_value(Some(&json!(NOW - 60)), "ctx"), NOW - 60);
    assert_eq!(
        g.validate_value(Some(&json!(format!("{}", NOW - 60))), "ctx"),
        NOW - 60
    );
}

#[tokio::test]
async fn reset_all_moves_every_cursor_three_days_back() {
    let (g, state, clock) = guard();
    state.set_cursor(CursorField::LastUpdateCheck, NOW - 10).await.unwrap();
    state.increment_consecutive_errors().await.unwrap();
    state.increment_consecutive_errors().await.unwrap();

    let target = g.reset_all("test").await.unwrap();

    assert_eq!(target, clock.unix() - 3 * DAY);
    for field in CursorField::ALL {
        assert_eq!(state.cursor(field).await.unwrap(), Some(NOW - 3 * DAY));
    }
    assert_eq!(state.consecutive_errors().await.unwrap(), 0);
}

#[tokio::test]
async fn cursor_reads_are_validated() {
    let (g, state, _) = guard();
    state
        .set_cursor(CursorField::LastDeepCheck, NOW + 10 * DAY)
        .await
        .unwrap();
    assert_eq!(g.cursor(CursorField::LastDeepCheck).await.unwrap(), NOW - 3600);
    assert_eq!(
        g.cursor(CursorField::LastContinuousCheck).await.unwrap(),
        NOW - 2 * 3600
    );
}
