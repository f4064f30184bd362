use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use httpmock::prelude::*;
use rust_decimal::Decimal;
use sojourn_core::{Sink, SinkCapabilities};
use sojourn_http::{HttpSink, OutboundClient};
use sojourn_middleware::Throttle;
use sojourn_types::{CanonicalReservation, Presence, RateLimitConfig, TrackingIds};
use url::Url;

fn client() -> OutboundClient {
    OutboundClient::new(
        Arc::new(Throttle::new(RateLimitConfig::default())),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn reservation() -> CanonicalReservation {
    CanonicalReservation {
        id: "R1".into(),
        alias_ids: BTreeSet::from(["R1".to_string()]),
        value: Decimal::new(25_000, 2),
        currency: "EUR".into(),
        guest_first_name: "Ada".into(),
        guest_last_name: "Lovelace".into(),
        email: Some("ada@example.com".into()),
        phone: None,
        language: Some("en".into()),
        checkin: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        checkout: NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
        accommodation_id: "101".into(),
        accommodation_name: "Sea view".into(),
        guests: 2,
        presence: Presence::Unset,
        session_id: Some("S1".into()),
        raw_value: Decimal::new(25_000, 2),
        unpaid_balance: Decimal::ZERO,
    }
}

async fn send_with_status(status: u16) -> sojourn_types::SendOutcome {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/hook")
                .header("authorization", "Bearer tok")
                .body_includes(r#""sink":"ga4""#);
            then.status(status).body("upstream says no");
        })
        .await;
    let sink = HttpSink::new(
        "ga4",
        SinkCapabilities::ONE_TIME,
        Some(Url::parse(&server.url("/hook")).unwrap()),
        client(),
    )
    .with_bearer("tok");
    sink.send(&reservation(), &TrackingIds::default()).await
}

#[tokio::test]
async fn success_on_2xx() {
    let out = send_with_status(204).await;
    assert!(out.success);
}

#[tokio::test]
async fn server_errors_are_retryable() {
    let out = send_with_status(503).await;
    assert!(!out.success);
    assert!(out.retryable);
    assert!(out.error.unwrap().contains("503"));
}

#[tokio::test]
async fn client_errors_are_permanent() {
    let out = send_with_status(422).await;
    assert!(!out.success);
    assert!(!out.retryable);
}

#[tokio::test]
async fn missing_endpoint_is_unconfigured() {
    let sink = HttpSink::new("meta", SinkCapabilities::ONE_TIME, None, client());
    assert!(!sink.is_configured());
    assert!(sink.send(&reservation(), &TrackingIds::default()).await.skipped);
}
