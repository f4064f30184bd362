use serde_json::{Map, Value, json};
use sojourn_core::RawReservation;

/// Builder for raw reservation records in the vendor's field naming.
#[derive(Debug, Clone)]
pub struct ReservationFixture {
    fields: Map<String, Value>,
}

/// Minimal valid record: id, stay dates, guest, price.
#[must_use]
pub fn reservation(id: &str) -> ReservationFixture {
    let mut fields = Map::new();
    fields.insert("id".into(), json!(id));
    fields.insert("from_date".into(), json!("2025-07-01"));
    fields.insert("to_date".into(), json!("2025-07-04"));
    fields.insert("first_name".into(), json!("Grace"));
    fields.insert("last_name".into(), json!("Hopper"));
    fields.insert("email".into(), json!("grace@example.com"));
    fields.insert("price".into(), json!("450.00"));
    fields.insert("currency".into(), json!("EUR"));
    fields.insert("guests".into(), json!(2));
    ReservationFixture { fields }
}

impl ReservationFixture {
    /// Set or replace any field.
    #[must_use]
    pub fn field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Drop a field.
    #[must_use]
    pub fn without(mut self, key: &str) -> Self {
        self.fields.remove(key);
        self
    }

    /// Set the presence status.
    #[must_use]
    pub fn presence(self, presence: &str) -> Self {
        self.field("presence", json!(presence))
    }

    /// Set the gross price.
    #[must_use]
    pub fn price(self, price: &str) -> Self {
        self.field("price", json!(price))
    }

    /// Set the guest email.
    #[must_use]
    pub fn email(self, email: &str) -> Self {
        self.field("email", json!(email))
    }

    /// Add a secondary id under `booking_code`.
    #[must_use]
    pub fn alias(self, code: &str) -> Self {
        self.field("booking_code", json!(code))
    }

    /// Nest a session id inside a JSON-encoded notes field.
    #[must_use]
    pub fn session(self, sid: &str) -> Self {
        self.field("notes", json!(format!("{{\"sid\":\"{sid}\"}}")))
    }

    /// Finish.
    #[must_use]
    pub fn build(self) -> RawReservation {
        RawReservation::new(self.fields)
    }
}
