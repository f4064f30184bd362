use rust_decimal::Decimal;
use serde_json::json;
use sojourn_core::fields::parse_decimal;
use sojourn_core::{Presence, RawReservation, ReservationTransformer, TransformOptions};

fn raw(v: serde_json::Value) -> RawReservation {
    RawReservation::try_from(v).unwrap()
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

#[test]
fn decimal_parsing_is_locale_tolerant() {
    assert_eq!(parse_decimal("1.234,56"), Some(dec("1234.56")));
    assert_eq!(parse_decimal("1,234.56"), Some(dec("1234.56")));
    assert_eq!(parse_decimal("1234,56"), Some(dec("1234.56")));
    assert_eq!(parse_decimal("€ 99"), Some(dec("99")));
    assert_eq!(parse_decimal("1,234,567"), Some(dec("1234567")));
    assert_eq!(parse_decimal("1.234.567"), Some(dec("1234567")));
    assert_eq!(parse_decimal("n/a"), None);
}

#[test]
fn full_record_normalizes() {
    let t = ReservationTransformer::default();
    let (res, tracking) = t
        .transform(&raw(json!({
            "id": 991,
            "booking_code": "BK991",
            "guest_name": "Ada   Lovelace",
            "email": "ada@example.com",
            "from_date": "2025-06-01",
            "to_date": "2025-06-04 00:00:00",
            "price": "1.234,50",
            "currency": "eur",
            "guests": "0",
            "lang": "IT-it",
            "presence": "1",
            "notes": {"tracking": "{\"sid\": \"S-42\", \"gclid\": \"G-1\"}"}
        })))
        .unwrap();

    assert_eq!(res.id, "991");
    assert!(res.alias_ids.contains("BK991"));
    assert_eq!(res.guest_first_name, "Ada");
    assert_eq!(res.guest_last_name, "Lovelace");
    assert_eq!(res.value, dec("1234.50"));
    assert_eq!(res.currency, "EUR");
    assert_eq!(res.guests, 1);
    assert_eq!(res.language.as_deref(), Some("it"));
    assert_eq!(res.presence, Presence::Arrived);
    assert_eq!(res.nights(), 3);
    assert_eq!(res.session_id.as_deref(), Some("S-42"));
    assert_eq!(tracking.gclid.as_deref(), Some("G-1"));
}

#[test]
fn missing_dates_yield_none() {
    let t = ReservationTransformer::default();
    assert!(t.transform(&raw(json!({"id": "1", "from_date": "2025-01-01"}))).is_none());
}

#[test]
fn net_value_policy_and_clamping() {
    let net = ReservationTransformer::new(TransformOptions {
        use_net_value: true,
        default_currency: None,
    });
    let base = json!({"id": "1", "from_date": "2025-01-01", "to_date": "2025-01-02"});

    let mut r = base.clone();
    r["price"] = json!(500);
    r["unpaid_balance"] = json!("120.00");
    assert_eq!(net.transform(&raw(r)).unwrap().0.value, dec("380"));

    let mut r = base.clone();
    r["price"] = json!(100);
    r["unpaid_balance"] = json!(150);
    assert_eq!(net.transform(&raw(r)).unwrap().0.value, Decimal::ZERO);

    let mut r = base;
    r["price"] = json!(-20);
    let gross = ReservationTransformer::default();
    assert_eq!(gross.transform(&raw(r)).unwrap().0.value, Decimal::ZERO);
}

#[test]
fn currency_cascade() {
    let base = json!({"id": "1", "from_date": "2025-01-01", "to_date": "2025-01-02"});

    let mut r = base.clone();
    r["price_currency_label"] = json!("usd");
    let (res, _) = ReservationTransformer::default().transform(&raw(r)).unwrap();
    assert_eq!(res.currency, "USD");

    let with_default = ReservationTransformer::new(TransformOptions {
        use_net_value: false,
        default_currency: Some("chf".into()),
    });
    assert_eq!(with_default.transform(&raw(base.clone())).unwrap().0.currency, "CHF");
    assert_eq!(
        ReservationTransformer::default().transform(&raw(base)).unwrap().0.currency,
        "EUR"
    );
}

#[test]
fn id_falls_back_to_first_scalar_field() {
    let (res, _) = ReservationTransformer::default()
        .transform(&raw(json!({"pnr": "XYZ", "from_date": "2025-01-01", "to_date": "2025-01-02"})))
        .unwrap();
    assert_eq!(res.id, "XYZ");
    assert_eq!(res.alias_ids.len(), 1);
}

#[test]
fn language_keeps_two_letters_or_nothing() {
    let t = ReservationTransformer::default();
    let base = json!({"id": "1", "from_date": "2025-07-01", "to_date": "2025-07-02"});
    let lang = |value: serde_json::Value| {
        let mut record = base.clone();
        record["language"] = value;
        t.transform(&raw(record)).unwrap().0.language
    };

    assert_eq!(lang(json!("EN-gb")), Some("en".to_string()));
    assert_eq!(lang(json!("de")), Some("de".to_string()));
    assert_eq!(lang(json!("e")), None);
    assert_eq!(lang(json!("  ")), None);
}
