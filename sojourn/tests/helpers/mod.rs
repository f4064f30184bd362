#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sojourn::{
    CursorField, Engine, ManualClock, MemoryLockProvider, MemoryRetryRepository,
    MemoryStateStore, StateStore, SyncConfig,
};
use sojourn_mock::{MockSink, MockSource};

/// 2025-07-01T12:00:00Z
pub const START: i64 = 1_751_371_200;
pub const DAY: i64 = 86_400;

pub fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(START, 0).unwrap()
}

pub struct Harness {
    pub engine: Arc<Engine>,
    pub source: MockSource,
    pub clock: Arc<ManualClock>,
    pub state: Arc<MemoryStateStore>,
    pub retries: Arc<MemoryRetryRepository>,
    pub locks: Arc<MemoryLockProvider>,
}

impl Harness {
    pub async fn cursor(&self, field: CursorField) -> Option<i64> {
        self.state.cursor(field).await.unwrap()
    }
}

pub fn config() -> SyncConfig {
    SyncConfig {
        property_id: Some("P-1".into()),
        ..SyncConfig::default()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn harness(cfg: SyncConfig, sinks: &[MockSink]) -> Harness {
    init_tracing();
    let source = MockSource::new();
    let clock = Arc::new(ManualClock::new(start()));
    let state = Arc::new(MemoryStateStore::new());
    let retries = Arc::new(MemoryRetryRepository::new());
    let locks = Arc::new(MemoryLockProvider::new());

    let mut builder = Engine::builder()
        .with_config(cfg)
        .with_source(Arc::new(source.clone()))
        .with_clock(clock.clone())
        .with_state_store(state.clone())
        .with_retry_repository(retries.clone())
        .with_lock_provider(locks.clone());
    for sink in sinks {
        builder = builder.with_sink(Arc::new(sink.clone()));
    }
    Harness {
        engine: Arc::new(builder.build().unwrap()),
        source,
        clock,
        state,
        retries,
        locks,
    }
}

/// ga4, meta and brevo_contact with default capabilities.
pub fn standard_sinks() -> Vec<MockSink> {
    vec![
        MockSink::new("ga4"),
        MockSink::new("meta"),
        MockSink::new("brevo_contact"),
    ]
}
