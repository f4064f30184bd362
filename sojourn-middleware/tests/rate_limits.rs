use std::time::Duration;

use sojourn_middleware::{RateLimiter, Throttle};
use sojourn_types::{HostBudget, RateLimitConfig, SyncError};
use url::Url;

const WINDOW: Duration = Duration::from_secs(60);

#[tokio::test(start_paused = true)]
async fn sixth_attempt_in_window_is_rejected_then_recovers() {
    let limiter = RateLimiter::new();
    for expected_remaining in (0..5).rev() {
        let d = limiter.attempt("pms", 5, WINDOW);
        assert!(d.allowed);
        assert_eq!(d.remaining, expected_remaining);
    }

    let rejected = limiter.attempt("pms", 5, WINDOW);
    assert!(!rejected.allowed);
    assert!(rejected.retry_after > Duration::ZERO);
    assert!(rejected.retry_after <= WINDOW);

    // Rejections do not consume quota or push the window out.
    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(!limiter.attempt("pms", 5, WINDOW).allowed);

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(limiter.attempt("pms", 5, WINDOW).allowed);
    assert_eq!(limiter.remaining("pms", 5, WINDOW), 4);
}

#[tokio::test(start_paused = true)]
async fn keys_are_independent() {
    let limiter = RateLimiter::new();
    assert!(limiter.attempt("a", 1, WINDOW).allowed);
    assert!(!limiter.attempt("a", 1, WINDOW).allowed);
    assert!(limiter.attempt("b", 1, WINDOW).allowed);
    limiter.clear("a");
    assert!(limiter.attempt("a", 1, WINDOW).allowed);
}

#[tokio::test(start_paused = true)]
async fn throttle_scopes_budget_by_host() {
    let throttle = Throttle::new(RateLimitConfig::default().with_host(
        "API.example.com",
        HostBudget {
            max_attempts: 2,
            window: WINDOW,
        },
    ));
    let limited = Url::parse("https://api.example.com/reservations/1").unwrap();
    let other = Url::parse("https://hooks.example.org/event").unwrap();

    throttle.admit(&limited).unwrap();
    throttle.admit(&limited).unwrap();
    let err = throttle.admit(&limited).unwrap_err();
    match err {
        SyncError::RateLimited {
            scope,
            retry_after_secs,
        } => {
            assert_eq!(scope, "api.example.com");
            assert!(retry_after_secs >= 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    for _ in 0..10 {
        throttle.admit(&other).unwrap();
    }

    let snap = throttle.snapshot();
    assert_eq!(snap["api.example.com"].remaining, 0);
    tokio::time::advance(WINDOW).await;
    assert_eq!(throttle.snapshot()["api.example.com"].remaining, 2);
}

#[tokio::test(start_paused = true)]
async fn retry_after_hint_rounds_up_to_whole_seconds() {
    let throttle = Throttle::new(RateLimitConfig::default().with_host(
        "api.example.com",
        HostBudget {
            max_attempts: 1,
            window: WINDOW,
        },
    ));
    let url = Url::parse("https://api.example.com/reservations").unwrap();
    throttle.admit(&url).unwrap();

    tokio::time::advance(Duration::from_millis(58_100)).await;
    match throttle.admit(&url).unwrap_err() {
        SyncError::RateLimited {
            retry_after_secs, ..
        } => assert_eq!(retry_after_secs, 2),
        other => panic!("unexpected error: {other:?}"),
    }
}
