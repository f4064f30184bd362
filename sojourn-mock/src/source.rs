use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sojourn_core::{DateRangeQuery, RawReservation, ReservationSource, SyncError};
use tokio::sync::Mutex;

/// Instruction for how one fetch call should behave.
#[derive(Debug, Clone)]
pub enum MockBehavior<T> {
    /// Return the provided value immediately.
    Return(T),
    /// Fail immediately with the provided error.
    Fail(SyncError),
    /// Sleep for the given time, then return the value.
    Delay(Duration, T),
    /// Hang indefinitely (simulate a stalled upstream).
    Hang,
}

/// One recorded fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    /// `fetch_updated_since`
    Updated {
        /// Property id.
        property_id: String,
        /// Cursor passed.
        since: i64,
        /// Page size passed.
        limit: Option<u32>,
    },
    /// `fetch_by_date_range`
    DateRange {
        /// Property id.
        property_id: String,
        /// Query passed.
        query: DateRangeQuery,
    },
}

#[derive(Default)]
struct State {
    updated: VecDeque<MockBehavior<Vec<RawReservation>>>,
    date_range: VecDeque<MockBehavior<Vec<RawReservation>>>,
    calls: Vec<SourceCall>,
}

/// Scripted [`ReservationSource`].
///
/// Each call pops the next scripted behaviour for its endpoint; an empty
/// script returns an empty list.
#[derive(Clone, Default)]
pub struct MockSource {
    state: Arc<Mutex<State>>,
}

impl MockSource {
    /// Empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next `fetch_updated_since` response.
    pub async fn push_updated(&self, behavior: MockBehavior<Vec<RawReservation>>) {
        self.state.lock().await.updated.push_back(behavior);
    }

    /// Queue the next `fetch_by_date_range` response.
    pub async fn push_date_range(&self, behavior: MockBehavior<Vec<RawReservation>>) {
        self.state.lock().await.date_range.push_back(behavior);
    }

    /// Every call made so far, in order.
    pub async fn calls(&self) -> Vec<SourceCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of calls made so far.
    pub async fn call_count(&self) -> usize {
        self.state.lock().await.calls.len()
    }

    async fn play(
        behavior: Option<MockBehavior<Vec<RawReservation>>>,
    ) -> Result<Vec<RawReservation>, SyncError> {
        match behavior {
            None => Ok(Vec::new()),
            Some(MockBehavior::Return(v)) => Ok(v),
            Some(MockBehavior::Fail(e)) => Err(e),
            Some(MockBehavior::Delay(d, v)) => {
                tokio::time::sleep(d).await;
                Ok(v)
            }
            Some(MockBehavior::Hang) => std::future::pending().await,
        }
    }
}

#[async_trait]
impl ReservationSource for MockSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch_by_date_range(
        &self,
        property_id: &str,
        query: &DateRangeQuery,
    ) -> Result<Vec<RawReservation>, SyncError> {
        // Release the lock before playing so a Hang does not wedge the controller.
        let behavior = {
            let mut guard = self.state.lock().await;
            guard.calls.push(SourceCall::DateRange {
                property_id: property_id.to_string(),
                query: query.clone(),
            });
            guard.date_range.pop_front()
        };
        Self::play(behavior).await
    }

    async fn fetch_updated_since(
        &self,
        property_id: &str,
        since: i64,
        limit: Option<u32>,
    ) -> Result<Vec<RawReservation>, SyncError> {
        let behavior = {
            let mut guard = self.state.lock().await;
            guard.calls.push(SourceCall::Updated {
                property_id: property_id.to_string(),
                since,
                limit,
            });
            guard.updated.pop_front()
        };
        Self::play(behavior).await
    }
}
