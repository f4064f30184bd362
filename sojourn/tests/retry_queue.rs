mod helpers;

use std::time::Duration;

use chrono::Duration as Span;
use helpers::{config, harness, standard_sinks, start};
use serde_json::json;
use sojourn::{
    ItemOutcome, LockProvider, RetryItem, RetryPolicy, RetryRepository, RetryState, SendOutcome,
    reservation_key,
};
use sojourn_mock::{MockBehavior, MockSink, reservation};

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        retry_delay: Duration::from_secs(60),
        batch_size: 25,
    }
}

fn seeded(n: u64, id: &str, sink: &str, payload: Option<serde_json::Value>) -> RetryItem {
    RetryItem {
        id: n,
        reservation_id: id.into(),
        sink: sink.into(),
        attempt_count: 0,
        payload,
        last_error: None,
        next_attempt_at: start(),
        state: RetryState::Queued,
        created_at: start(),
        updated_at: start(),
    }
}

#[tokio::test]
async fn retryable_failures_end_in_permanent_failure() {
    let mut cfg = config();
    cfg.retry = policy(3);
    let sinks = standard_sinks();
    sinks[1].push_outcomes(&SendOutcome::retryable("HTTP 503"), 10);
    let h = harness(cfg, &sinks);

    let outcome = h.engine.ingest(&reservation("R1").build()).await.unwrap();
    let ItemOutcome::Dispatched(result) = outcome else {
        panic!("expected a dispatch, got {outcome:?}");
    };
    assert_eq!(result.failed_integrations, vec!["meta".to_string()]);

    // Not due yet.
    let early = h.engine.run_retries().await.unwrap();
    assert_eq!(early.picked, 0);

    let mut requeued = 0;
    for _ in 0..3 {
        h.clock.advance(Duration::from_secs(60));
        let report = h.engine.run_retries().await.unwrap();
        assert_eq!(report.picked, 1);
        requeued += report.requeued;
    }
    assert_eq!(requeued, 2);

    let items = h.retries.list(None).await.unwrap();
    assert_eq!(items.len(), 1);
    let done = items[0].clone();
    assert_eq!(done.state, RetryState::PermanentFailure);
    assert_eq!(done.attempt_count, 3);
    assert!(
        done.last_error
            .as_deref()
            .is_some_and(|e| e.contains("max attempts"))
    );
    assert_eq!(sinks[1].call_count(), 4);

    // Terminal: never picked or mutated again.
    h.clock.advance(Duration::from_secs(3_600));
    let later = h.engine.run_retries().await.unwrap();
    assert_eq!(later.picked, 0);
    assert_eq!(h.retries.get(done.id).await.unwrap(), Some(done));
    assert_eq!(sinks[1].call_count(), 4);
}

#[tokio::test]
async fn successful_retry_completes_item() {
    let mut cfg = config();
    cfg.retry = policy(5);
    let sinks = standard_sinks();
    sinks[0].push_outcome(SendOutcome::retryable("timeout"));
    let h = harness(cfg, &sinks);
    h.engine.ingest(&reservation("R1").build()).await.unwrap();

    h.clock.advance(Duration::from_secs(60));
    let report = h.engine.run_retries().await.unwrap();

    assert_eq!(report.completed, 1);
    let stats = h.engine.retry_stats().await.unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.queued, 0);
    let item = &h.retries.list(Some(RetryState::Completed)).await.unwrap()[0];
    assert_eq!(item.attempt_count, 1);
    assert_eq!(item.last_error, None);
    assert_eq!(sinks[0].call_count(), 2);
}

#[tokio::test]
async fn non_retryable_failure_on_retry_is_permanent() {
    let sinks = standard_sinks();
    sinks[1].push_outcome(SendOutcome::retryable("HTTP 500"));
    sinks[1].push_outcome(SendOutcome::permanent("HTTP 400: invalid pixel id"));
    let h = harness(config(), &sinks);
    h.engine.ingest(&reservation("R1").build()).await.unwrap();

    h.clock.advance(Duration::from_secs(15 * 60));
    let report = h.engine.run_retries().await.unwrap();

    assert_eq!(report.permanent_failures, 1);
    let stats = h.engine.retry_stats().await.unwrap();
    assert_eq!(stats.permanent_failure, 1);
}

#[tokio::test]
async fn unusable_items_fail_permanently() {
    let h = harness(config(), &standard_sinks());
    h.retries.seed(seeded(1, "R1", "ga4", None));
    h.retries
        .seed(seeded(2, "R2", "ga4", Some(json!({"reservation": "not an object"}))));

    let mut valid = seeded(3, "R3", "tiktok", None);
    let raw = reservation("R3").build();
    let (canonical, tracking) = sojourn::ReservationTransformer::default()
        .transform(&raw)
        .unwrap();
    valid.payload = Some(json!({"reservation": canonical, "tracking": tracking}));
    h.retries.seed(valid);

    let report = h.engine.run_retries().await.unwrap();

    assert_eq!(report.picked, 3);
    assert_eq!(report.permanent_failures, 3);
    let reasons: Vec<String> = h
        .retries
        .list(Some(RetryState::PermanentFailure))
        .await
        .unwrap()
        .into_iter()
        .filter_map(|i| i.last_error)
        .collect();
    assert!(reasons.iter().any(|r| r == "missing payload"));
    assert!(reasons.iter().any(|r| r.starts_with("corrupt payload")));
    assert!(reasons.iter().any(|r| r == "unknown sink tiktok"));
}

#[tokio::test]
async fn busy_reservation_defers_retry() {
    let sinks = standard_sinks();
    sinks[0].push_outcome(SendOutcome::retryable("HTTP 502"));
    let h = harness(config(), &sinks);
    h.engine.ingest(&reservation("R1").build()).await.unwrap();
    let token = h
        .locks
        .try_acquire(&reservation_key("R1"), Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();

    h.clock.advance(Duration::from_secs(15 * 60));
    let report = h.engine.run_retries().await.unwrap();

    assert_eq!(report.busy, 1);
    let items = h.retries.list(None).await.unwrap();
    assert_eq!(items[0].state, RetryState::Queued);
    assert_eq!(items[0].attempt_count, 0);

    h.locks.release(&reservation_key("R1"), token).await.unwrap();
    let report = h.engine.run_retries().await.unwrap();
    assert_eq!(report.completed, 1);
}

#[tokio::test]
async fn repeated_failure_refreshes_the_active_item() {
    let mut cfg = config();
    cfg.allow_status_updates = true;
    let sinks = standard_sinks();
    sinks[2].push_outcomes(&SendOutcome::retryable("HTTP 429"), 2);
    let h = harness(cfg, &sinks);

    h.engine.ingest(&reservation("R1").build()).await.unwrap();
    h.clock.advance(Duration::from_secs(30));
    h.engine
        .ingest(&reservation("R1").presence("departed").build())
        .await
        .unwrap();

    let items = h.retries.list(None).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].sink, "brevo_contact");
    assert_eq!(items[0].updated_at, start() + Span::seconds(30));
    let payload = items[0].decode_payload().unwrap();
    assert_eq!(payload.reservation.presence, sojourn::Presence::Departed);
}

#[tokio::test]
async fn live_redelivery_settles_the_queued_retry() {
    let ga4 = MockSink::new("ga4");
    ga4.push_outcome(SendOutcome::retryable("HTTP 503"));
    let h = harness(config(), std::slice::from_ref(&ga4));
    let raw = reservation("R1").build();

    h.source
        .push_updated(MockBehavior::Return(vec![raw.clone()]))
        .await;
    h.engine.run_continuous().await.unwrap();
    assert_eq!(h.retries.list(Some(RetryState::Queued)).await.unwrap().len(), 1);

    // The cursor overlap hands the same record to the next pass, which delivers it.
    h.clock.advance(Duration::from_secs(30));
    h.source.push_updated(MockBehavior::Return(vec![raw])).await;
    h.engine.run_continuous().await.unwrap();
    assert_eq!(ga4.call_count(), 2);

    h.clock.advance(Duration::from_secs(20 * 60));
    let report = h.engine.run_retries().await.unwrap();

    assert_eq!(report.picked, 0);
    assert_eq!(ga4.call_count(), 2);
    let items = h.retries.list(None).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].state, RetryState::Completed);
    assert_eq!(items[0].last_error, None);
}

#[tokio::test]
async fn retry_waits_while_any_alias_is_locked() {
    let sinks = standard_sinks();
    sinks[0].push_outcome(SendOutcome::retryable("HTTP 502"));
    let h = harness(config(), &sinks);
    h.engine
        .ingest(&reservation("R1").alias("BK-9").build())
        .await
        .unwrap();
    let token = h
        .locks
        .try_acquire(&reservation_key("BK-9"), Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();

    h.clock.advance(Duration::from_secs(15 * 60));
    let report = h.engine.run_retries().await.unwrap();
    assert_eq!(report.busy, 1);
    assert_eq!(sinks[0].call_count(), 1);
    // The alias that was free is not left held.
    let free = h
        .locks
        .try_acquire(&reservation_key("R1"), Duration::from_secs(60))
        .await
        .unwrap()
        .expect("R1 released after the busy attempt");
    h.locks.release(&reservation_key("R1"), free).await.unwrap();

    h.locks.release(&reservation_key("BK-9"), token).await.unwrap();
    let report = h.engine.run_retries().await.unwrap();
    assert_eq!(report.completed, 1);
}
