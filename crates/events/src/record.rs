use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use civicgate_core::{DomainError, DomainResult, EventId, EventType, ModuleName};

/// An event that has been validated but not yet persisted.
///
/// `NewEvent` is what a publisher hands to the event store. The store assigns
/// the `id` and `timestamp` and returns an [`EventRecord`].
///
/// The payload is kept opaque: the bus never inspects its contents beyond
/// requiring a JSON object. Consumers decode their own typed view of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub event_type: EventType,
    pub source_module: ModuleName,
    pub payload: JsonValue,
}

impl NewEvent {
    /// Validate raw publish arguments.
    ///
    /// Fails when either name is blank or when the payload is not a JSON object
    /// (an empty object is fine; `null`, arrays and scalars are not).
    pub fn new(
        event_type: impl AsRef<str>,
        source_module: impl AsRef<str>,
        payload: JsonValue,
    ) -> DomainResult<Self> {
        let event_type = EventType::parse(event_type)?;
        let source_module = ModuleName::parse(source_module)?;
        if !payload.is_object() {
            return Err(DomainError::validation(format!(
                "payload must be a JSON object, got {}",
                json_kind(&payload)
            )));
        }

        Ok(Self {
            event_type,
            source_module,
            payload,
        })
    }

    /// Attach the store-assigned identity, producing the persisted form.
    pub fn into_record(self, id: EventId, timestamp: DateTime<Utc>) -> EventRecord {
        EventRecord {
            id,
            event_type: self.event_type,
            source_module: self.source_module,
            payload: self.payload,
            timestamp,
        }
    }
}

/// A persisted integration event (append-only, immutable).
///
/// Serialized shape:
///
/// ```text
/// { "id": 17, "event_type": "document.issued", "source_module": "documents",
///   "payload": { ... }, "timestamp": "2026-03-01T09:30:00.123Z" }
/// ```
///
/// `id` and `timestamp` are assigned by the store. Within one store instance,
/// a larger `id` never has a smaller `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub event_type: EventType,
    pub source_module: ModuleName,
    pub payload: JsonValue,
    pub timestamp: DateTime<Utc>,
}

impl EventRecord {
    /// Decode the payload into a module-specific typed view.
    pub fn payload_as<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_value(self.payload.clone())
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_empty_object_payload() {
        let ev = NewEvent::new("address.changed", "address", json!({})).unwrap();
        assert_eq!(ev.event_type, "address.changed");
        assert_eq!(ev.source_module, "address");
    }

    #[test]
    fn rejects_null_and_non_object_payloads() {
        for payload in [json!(null), json!([1, 2]), json!("x"), json!(3)] {
            let err = NewEvent::new("a.b", "m", payload).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn rejects_blank_names() {
        assert!(NewEvent::new("", "documents", json!({})).is_err());
        assert!(NewEvent::new("document.issued", "  ", json!({})).is_err());
    }

    #[test]
    fn payload_as_decodes_a_typed_view() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct Issued {
            citizen_id: i64,
            document_id: String,
        }

        let record = NewEvent::new(
            "document.issued",
            "documents",
            json!({"citizen_id": 42, "document_id": "P-001", "extra": true}),
        )
        .unwrap()
        .into_record(EventId::new(1).unwrap(), Utc::now());

        assert_eq!(
            record.payload_as::<Issued>().unwrap(),
            Issued { citizen_id: 42, document_id: "P-001".to_string() }
        );
        assert!(record.payload_as::<Vec<i64>>().is_err());
    }

    #[test]
    fn record_serializes_to_transport_shape() {
        let ts = DateTime::parse_from_rfc3339("2026-03-01T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = NewEvent::new("document.issued", "documents", json!({"citizen_id": 42}))
            .unwrap()
            .into_record(EventId::new(5).unwrap(), ts);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], json!(5));
        assert_eq!(value["event_type"], json!("document.issued"));
        assert_eq!(value["source_module"], json!("documents"));
        assert_eq!(value["payload"]["citizen_id"], json!(42));
        assert_eq!(value["timestamp"], json!("2026-03-01T09:30:00Z"));
    }
}
