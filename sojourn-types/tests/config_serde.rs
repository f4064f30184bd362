use std::time::Duration;

use sojourn_types::{
    ConnectionMode, Credentials, DateType, HostBudget, RateLimitConfig, SinkToggles, SyncConfig,
    SyncError,
};

#[test]
fn sync_config_fills_defaults_from_partial_json() {
    let json = r#"{
        "credentials": { "base_url": "https://pms.example.com/api", "username": "u", "password": "p" },
        "property_id": "42",
        "allow_status_updates": true,
        "connection_mode": "webhook_only",
        "rate_limits": { "hosts": { "PMS.example.com": { "max_attempts": 5, "window": 60 } } }
    }"#;

    let cfg: SyncConfig = serde_json::from_str(json).expect("deserialize sync config");

    assert_eq!(cfg.property_id.as_deref(), Some("42"));
    assert!(cfg.allow_status_updates);
    assert!(!cfg.use_net_value);
    assert_eq!(cfg.connection_mode, ConnectionMode::WebhookOnly);
    assert_eq!(cfg.retry.max_attempts, 5);
    assert_eq!(cfg.circuit.error_threshold, 3);
    assert_eq!(cfg.circuit.cooldown, Duration::from_secs(300));
    assert_eq!(cfg.poll.batch_budget, Duration::from_secs(25));
    assert_eq!(cfg.request_timeout, Duration::from_secs(30));
    assert!(cfg.rate_limits.budget_for("pms.example.com").is_some());
}

#[test]
fn rate_limit_lookup_is_case_insensitive() {
    let cfg = RateLimitConfig::default().with_host(
        "Api.Example.com",
        HostBudget {
            max_attempts: 5,
            window: Duration::from_secs(60),
        },
    );
    assert!(cfg.budget_for("api.example.com").is_some());
    assert!(cfg.budget_for("API.EXAMPLE.COM").is_some());
    assert!(cfg.budget_for("other.example.com").is_none());
}

#[test]
fn unlisted_sinks_are_enabled() {
    let toggles = SinkToggles::default().with("meta", false);
    assert!(!toggles.is_enabled("meta"));
    assert!(toggles.is_enabled("ga4"));
}

#[test]
fn credentials_debug_redacts_password() {
    let creds = Credentials {
        base_url: Some("https://pms.example.com".into()),
        username: Some("user".into()),
        password: Some("hunter2".into()),
    };
    let dbg = format!("{creds:?}");
    assert!(!dbg.contains("hunter2"));
    assert!(dbg.contains("<redacted>"));
}

#[test]
fn date_type_rejects_unknown_values() {
    assert_eq!("checkin".parse::<DateType>(), Ok(DateType::Checkin));
    assert_eq!(" Presence ".parse::<DateType>(), Ok(DateType::Presence));
    let err = "created".parse::<DateType>().unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
}

#[test]
fn sync_error_roundtrip() {
    let err = SyncError::rate_limited("api.example.com", 12);
    let json = serde_json::to_string(&err).expect("serialize error");
    let de: SyncError = serde_json::from_str(&json).expect("deserialize error");
    assert_eq!(de, err);
    assert!(de.is_retryable());
    assert!(!de.counts_toward_circuit());
}
