mod helpers;

use std::time::Duration;

use chrono::NaiveDate;
use helpers::{DAY, START, config, harness, standard_sinks};
use sojourn::{
    Cadence, CursorField, DateType, LockProvider, POLL_LOCK, PassOutcome, Presence,
    RetryRepository, RetryState, SendOutcome, StateStore, SyncError,
};
use sojourn_mock::{MockBehavior, MockSink, SourceCall, reservation};

#[tokio::test]
async fn continuous_pass_dispatches_and_advances_cursor() {
    let sinks = standard_sinks();
    let h = harness(config(), &sinks);
    h.source
        .push_updated(MockBehavior::Return(vec![
            reservation("R1").build(),
            reservation("R2").build(),
        ]))
        .await;

    let report = h.engine.run_continuous().await.unwrap();

    assert_eq!(report.cadence, Cadence::Continuous);
    assert_eq!(report.outcome, PassOutcome::Completed);
    assert_eq!(report.fetched, 2);
    assert_eq!(report.new, 2);
    assert_eq!(report.errors, 0);
    assert!(!report.continuation_needed);
    for sink in &sinks {
        assert_eq!(sink.call_count(), 2);
    }

    // No stored cursor: starts two hours back.
    assert_eq!(
        h.source.calls().await,
        vec![SourceCall::Updated {
            property_id: "P-1".into(),
            since: START - 7_200,
            limit: None,
        }]
    );
    assert_eq!(h.cursor(CursorField::LastUpdateCheck).await, Some(START - 60));
    assert_eq!(h.cursor(CursorField::LastContinuousCheck).await, Some(START));
}

#[tokio::test]
async fn empty_result_is_not_an_error() {
    let h = harness(config(), &standard_sinks());
    h.source.push_updated(MockBehavior::Return(vec![])).await;

    let report = h.engine.run_continuous().await.unwrap();

    assert_eq!(report.fetched, 0);
    assert_eq!(report.errors, 0);
    assert_eq!(h.state.consecutive_errors().await.unwrap(), 0);
    assert_eq!(h.cursor(CursorField::LastUpdateCheck).await, Some(START - 60));
}

#[tokio::test]
async fn repeated_records_are_duplicates() {
    let sinks = standard_sinks();
    let h = harness(config(), &sinks);
    let r1 = reservation("R1").alias("BK-9").build();
    h.source
        .push_updated(MockBehavior::Return(vec![r1.clone()]))
        .await;
    h.source
        .push_updated(MockBehavior::Return(vec![
            r1,
            // Same booking seen only through its secondary code.
            reservation("BK-9").build(),
        ]))
        .await;

    let first = h.engine.run_continuous().await.unwrap();
    let second = h.engine.run_continuous().await.unwrap();

    assert_eq!(first.new, 1);
    assert_eq!(second.new, 0);
    assert_eq!(second.duplicates, 2);
    assert_eq!(sinks[0].call_count(), 1);
}

#[tokio::test]
async fn records_without_dates_or_ids_are_skipped() {
    let sinks = standard_sinks();
    let h = harness(config(), &sinks);
    let no_dates = reservation("R1").without("from_date").build();
    let no_ids = reservation("R2").without("id").build();
    h.source
        .push_updated(MockBehavior::Return(vec![no_dates, no_ids]))
        .await;

    let report = h.engine.run_continuous().await.unwrap();

    assert_eq!(report.skipped, 2);
    assert_eq!(report.new, 0);
    assert_eq!(sinks[0].call_count(), 0);
}

#[tokio::test]
async fn fetch_error_leaves_cursor_untouched() {
    let h = harness(config(), &standard_sinks());
    h.source
        .push_updated(MockBehavior::Fail(SyncError::Upstream("HTTP 502".into())))
        .await;

    let report = h.engine.run_continuous().await.unwrap();

    assert_eq!(report.errors, 1);
    assert_eq!(report.outcome, PassOutcome::Completed);
    assert_eq!(h.cursor(CursorField::LastUpdateCheck).await, None);
    assert_eq!(h.cursor(CursorField::LastContinuousCheck).await, None);
    assert_eq!(h.state.consecutive_errors().await.unwrap(), 1);
}

#[tokio::test]
async fn timestamp_too_old_resets_every_cursor() {
    let h = harness(config(), &standard_sinks());
    h.state
        .set_cursor(CursorField::LastUpdateCheck, START - 3_600)
        .await
        .unwrap();
    h.state.increment_consecutive_errors().await.unwrap();
    h.source
        .push_updated(MockBehavior::Fail(SyncError::TimestampTooOld(
            "timestamp too old".into(),
        )))
        .await;

    let report = h.engine.run_continuous().await.unwrap();

    assert_eq!(report.errors, 1);
    for field in CursorField::ALL {
        assert_eq!(h.cursor(field).await, Some(START - 3 * DAY), "{field}");
    }
    assert_eq!(h.state.consecutive_errors().await.unwrap(), 0);
    assert!(h.engine.circuit_state().await.unwrap().is_none());
}

#[tokio::test]
async fn deep_check_sweeps_lookback_window() {
    let h = harness(config(), &standard_sinks());
    h.source
        .push_date_range(MockBehavior::Return(vec![reservation("R1").build()]))
        .await;

    let report = h.engine.run_deep_check().await.unwrap();

    assert_eq!(report.cadence, Cadence::DeepCheck);
    assert_eq!(report.new, 1);
    let calls = h.source.calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[0],
        SourceCall::Updated {
            property_id: "P-1".into(),
            since: START - 6 * DAY,
            limit: None,
        }
    );
    let SourceCall::DateRange { query, .. } = &calls[1] else {
        panic!("expected a date-range fetch, got {:?}", calls[1]);
    };
    assert_eq!(query.date_type, DateType::Checkin);
    assert_eq!(query.from, NaiveDate::from_ymd_opt(2025, 6, 25).unwrap());
    assert_eq!(query.to, NaiveDate::from_ymd_opt(2025, 7, 2).unwrap());

    assert_eq!(h.cursor(CursorField::LastDeepCheck).await, Some(START));
    assert_eq!(h.cursor(CursorField::LastUpdateCheck).await, None);
}

#[tokio::test]
async fn status_update_skips_one_time_sinks() {
    let mut cfg = config();
    cfg.allow_status_updates = true;
    let sinks = standard_sinks();
    let h = harness(cfg, &sinks);

    h.source
        .push_updated(MockBehavior::Return(vec![reservation("R1").build()]))
        .await;
    h.source
        .push_date_range(MockBehavior::Return(vec![
            reservation("R1").presence("arrived").build(),
        ]))
        .await;

    let report = h.engine.run_continuous().await.unwrap();

    assert_eq!(report.new, 1);
    assert_eq!(report.status_updates, 1);
    let calls = h.source.calls().await;
    let SourceCall::DateRange { query, .. } = &calls[1] else {
        panic!("expected a presence fetch");
    };
    assert_eq!(query.date_type, DateType::Presence);
    assert_eq!(query.from, query.to);

    // ga4 and meta are one-time; brevo_contact runs on both.
    assert_eq!(sinks[0].call_count(), 1);
    assert_eq!(sinks[1].call_count(), 1);
    assert_eq!(sinks[2].call_count(), 2);
    assert_eq!(sinks[2].calls()[1].presence, Presence::Arrived);
}

#[tokio::test]
async fn pass_is_skipped_while_poll_lock_is_held() {
    let h = harness(config(), &standard_sinks());
    let token = h
        .locks
        .try_acquire(POLL_LOCK, Duration::from_secs(120))
        .await
        .unwrap()
        .unwrap();

    let report = h.engine.run_deep_check().await.unwrap();

    assert_eq!(report.outcome, PassOutcome::LockBusy);
    assert_eq!(h.source.call_count().await, 0);
    assert!(h.locks.release(POLL_LOCK, token).await.unwrap());
    assert!(!h.locks.is_held(POLL_LOCK));
}

#[tokio::test]
async fn poll_lock_is_released_after_a_failed_pass() {
    let h = harness(config(), &standard_sinks());
    h.source
        .push_updated(MockBehavior::Fail(SyncError::Transport("connection reset".into())))
        .await;

    h.engine.run_continuous().await.unwrap();

    assert!(!h.locks.is_held(POLL_LOCK));
}

#[tokio::test(start_paused = true)]
async fn budget_overrun_requests_continuation() {
    let mut cfg = config();
    cfg.poll.batch_budget = Duration::from_secs(25);
    let slow = MockSink::new("ga4").with_delay(Duration::from_secs(10));
    let h = harness(cfg, std::slice::from_ref(&slow));
    let batch: Vec<_> = (1..=5)
        .map(|i| reservation(&format!("R{i}")).build())
        .collect();
    h.source
        .push_updated(MockBehavior::Return(batch.clone()))
        .await;
    h.source.push_updated(MockBehavior::Return(batch)).await;

    let first = h.engine.run_continuous().await.unwrap();

    assert!(first.continuation_needed);
    assert_eq!(first.new, 3);
    assert_eq!(h.cursor(CursorField::LastUpdateCheck).await, None);

    let second = h.engine.run_continuous().await.unwrap();

    assert!(!second.continuation_needed);
    assert_eq!(second.duplicates, 3);
    assert_eq!(second.new, 2);
    assert_eq!(slow.call_count(), 5);
    assert_eq!(h.cursor(CursorField::LastUpdateCheck).await, Some(START - 60));
}

#[tokio::test]
async fn partial_dispatch_queues_the_failed_sink() {
    let sinks = standard_sinks();
    sinks[1].push_outcome(SendOutcome::retryable("HTTP 503"));
    let h = harness(config(), &sinks);
    h.source
        .push_updated(MockBehavior::Return(vec![reservation("R1").build()]))
        .await;

    let report = h.engine.run_continuous().await.unwrap();

    assert_eq!(report.partial, 1);
    let items = h.retries.list(None).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].sink, "meta");
    assert_eq!(items[0].state, RetryState::Queued);
    assert_eq!(items[0].attempt_count, 0);
    assert_eq!(items[0].last_error.as_deref(), Some("HTTP 503"));
    assert!(
        h.engine
            .dedup()
            .is_processed(&["R1".to_string()])
            .await
            .unwrap()
    );
}
