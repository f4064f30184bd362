use std::time::Duration;

use chrono::{DateTime, Utc};
use sojourn_core::{
    LockProvider, MemoryLockProvider, MemoryRetryRepository, RetryItem, RetryRepository,
    RetryState, SyncError,
};

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_760_000_000 + secs, 0).unwrap()
}

fn item(reservation: &str, sink: &str, next: i64) -> RetryItem {
    RetryItem {
        id: 0,
        reservation_id: reservation.into(),
        sink: sink.into(),
        attempt_count: 0,
        payload: None,
        last_error: None,
        next_attempt_at: at(next),
        state: RetryState::Queued,
        created_at: at(0),
        updated_at: at(0),
    }
}

#[tokio::test(start_paused = true)]
async fn lock_is_exclusive_until_release_or_expiry() {
    let locks = MemoryLockProvider::new();
    let ttl = Duration::from_secs(60);

    let token = locks.try_acquire("reservation:R1", ttl).await.unwrap().unwrap();
    assert!(locks.try_acquire("reservation:R1", ttl).await.unwrap().is_none());
    assert!(locks.try_acquire("reservation:R2", ttl).await.unwrap().is_some());

    assert!(locks.release("reservation:R1", token).await.unwrap());
    assert!(!locks.release("reservation:R1", token).await.unwrap());

    let _held = locks.try_acquire("poll", ttl).await.unwrap().unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(!locks.is_held("poll"));
    assert!(locks.try_acquire("poll", ttl).await.unwrap().is_some());
}

#[tokio::test]
async fn due_items_are_ordered_and_limited() {
    let repo = MemoryRetryRepository::new();
    repo.insert(item("R1", "ga4", 30)).await.unwrap();
    let early = repo.insert(item("R2", "meta", 10)).await.unwrap();
    repo.insert(item("R3", "gtm", 500)).await.unwrap();

    let due = repo.due(at(100), 10).await.unwrap();
    assert_eq!(due.len(), 2);
    assert_eq!(due[0].id, early.id);

    assert_eq!(repo.due(at(100), 1).await.unwrap().len(), 1);
    assert!(repo.find_active("R3", "gtm").await.unwrap().is_some());
    assert!(repo.find_active("R3", "ga4").await.unwrap().is_none());
}

#[tokio::test]
async fn terminal_items_are_immutable() {
    let repo = MemoryRetryRepository::new();
    let mut it = repo.insert(item("R1", "ga4", 0)).await.unwrap();
    it.state = RetryState::PermanentFailure;
    repo.update(&it).await.unwrap();

    it.state = RetryState::Queued;
    let err = repo.update(&it).await.unwrap_err();
    assert!(matches!(err, SyncError::Store(_)));
    assert_eq!(
        repo.get(it.id).await.unwrap().unwrap().state,
        RetryState::PermanentFailure
    );
    assert!(repo.find_active("R1", "ga4").await.unwrap().is_none());
    assert_eq!(repo.list(Some(RetryState::PermanentFailure)).await.unwrap().len(), 1);
}
