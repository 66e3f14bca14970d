//! Citizenship module reactions.
//!
//! - `citizen.registered` → create the citizen profile
//! - `document.issued`    → append the document to the citizen's document list
//! - `address.changed`    → replace the citizen's current address
//!
//! All three are idempotent so a duplicate delivery leaves the profile unchanged.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use civicgate_core::EventId;
use civicgate_events::{EventHandler, EventRecord, HandlerError};

use super::{AddressChanged, CitizenRegistered, DocumentIssued, event_types, modules};
use crate::error::GatewayError;
use crate::event_store::EventRecordStore;
use crate::gateway::IntegrationBus;

/// A document attached to a citizen, with the event that announced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub document_type: String,
    pub document_id: String,
    pub event_id: EventId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitizenProfile {
    pub citizen_id: i64,
    pub full_name: String,
    pub address: Option<String>,
    pub documents: Vec<DocumentRef>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CitizenDirectoryError {
    #[error("unknown citizen {0}")]
    UnknownCitizen(i64),

    #[error("citizen directory unavailable: {0}")]
    Unavailable(String),
}

impl From<CitizenDirectoryError> for HandlerError {
    fn from(value: CitizenDirectoryError) -> Self {
        match value {
            CitizenDirectoryError::UnknownCitizen(_) => HandlerError::rejected(value.to_string()),
            CitizenDirectoryError::Unavailable(_) => HandlerError::failed(value.to_string()),
        }
    }
}

/// Citizenship data access (owned by the citizenship module).
#[async_trait::async_trait]
pub trait CitizenDirectory: Send + Sync {
    /// Create a profile; re-registering an existing citizen is a no-op.
    async fn register(&self, citizen_id: i64, full_name: &str) -> Result<(), CitizenDirectoryError>;

    /// Attach a document; attaching the same `document_id` twice is a no-op.
    async fn attach_document(&self, citizen_id: i64, document: DocumentRef) -> Result<(), CitizenDirectoryError>;

    async fn update_address(&self, citizen_id: i64, address: &str) -> Result<(), CitizenDirectoryError>;

    async fn get(&self, citizen_id: i64) -> Result<Option<CitizenProfile>, CitizenDirectoryError>;
}

/// In-memory citizen directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCitizenDirectory {
    citizens: RwLock<BTreeMap<i64, CitizenProfile>>,
}

impl InMemoryCitizenDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_citizen<T>(
        &self,
        citizen_id: i64,
        f: impl FnOnce(&mut CitizenProfile) -> T,
    ) -> Result<T, CitizenDirectoryError> {
        let mut map = self
            .citizens
            .write()
            .map_err(|_| CitizenDirectoryError::Unavailable("lock poisoned".to_string()))?;
        let profile = map
            .get_mut(&citizen_id)
            .ok_or(CitizenDirectoryError::UnknownCitizen(citizen_id))?;
        Ok(f(profile))
    }
}

#[async_trait::async_trait]
impl CitizenDirectory for InMemoryCitizenDirectory {
    async fn register(&self, citizen_id: i64, full_name: &str) -> Result<(), CitizenDirectoryError> {
        let mut map = self
            .citizens
            .write()
            .map_err(|_| CitizenDirectoryError::Unavailable("lock poisoned".to_string()))?;
        map.entry(citizen_id).or_insert_with(|| CitizenProfile {
            citizen_id,
            full_name: full_name.to_string(),
            address: None,
            documents: Vec::new(),
        });
        Ok(())
    }

    async fn attach_document(&self, citizen_id: i64, document: DocumentRef) -> Result<(), CitizenDirectoryError> {
        self.with_citizen(citizen_id, |profile| {
            if !profile.documents.iter().any(|d| d.document_id == document.document_id) {
                profile.documents.push(document);
            }
        })
    }

    async fn update_address(&self, citizen_id: i64, address: &str) -> Result<(), CitizenDirectoryError> {
        self.with_citizen(citizen_id, |profile| profile.address = Some(address.to_string()))
    }

    async fn get(&self, citizen_id: i64) -> Result<Option<CitizenProfile>, CitizenDirectoryError> {
        let map = self
            .citizens
            .read()
            .map_err(|_| CitizenDirectoryError::Unavailable("lock poisoned".to_string()))?;
        Ok(map.get(&citizen_id).cloned())
    }
}

pub struct CitizenRegisteredHandler {
    directory: Arc<dyn CitizenDirectory>,
}

impl CitizenRegisteredHandler {
    pub fn new(directory: Arc<dyn CitizenDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait::async_trait]
impl EventHandler for CitizenRegisteredHandler {
    async fn handle(&self, record: &EventRecord, _payload: &JsonValue) -> Result<(), HandlerError> {
        let event: CitizenRegistered = record.payload_as()?;
        self.directory.register(event.citizen_id, &event.full_name).await?;
        Ok(())
    }
}

pub struct DocumentIssuedHandler {
    directory: Arc<dyn CitizenDirectory>,
}

impl DocumentIssuedHandler {
    pub fn new(directory: Arc<dyn CitizenDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait::async_trait]
impl EventHandler for DocumentIssuedHandler {
    async fn handle(&self, record: &EventRecord, _payload: &JsonValue) -> Result<(), HandlerError> {
        let event: DocumentIssued = record.payload_as()?;
        let document = DocumentRef {
            document_type: event.document_type,
            document_id: event.document_id,
            event_id: record.id,
        };
        self.directory.attach_document(event.citizen_id, document).await?;
        Ok(())
    }
}

pub struct AddressChangedHandler {
    directory: Arc<dyn CitizenDirectory>,
}

impl AddressChangedHandler {
    pub fn new(directory: Arc<dyn CitizenDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait::async_trait]
impl EventHandler for AddressChangedHandler {
    async fn handle(&self, record: &EventRecord, _payload: &JsonValue) -> Result<(), HandlerError> {
        let event: AddressChanged = record.payload_as()?;
        if event.new_address.trim().is_empty() {
            return Err(HandlerError::payload("new_address must not be empty"));
        }
        self.directory
            .update_address(event.citizen_id, event.new_address.trim())
            .await?;
        Ok(())
    }
}

/// Register the citizenship module's handlers.
///
/// `document.issued` is only accepted from the documents module and
/// `address.changed` only from the address module.
pub fn register<S>(bus: &IntegrationBus<S>, directory: Arc<dyn CitizenDirectory>) -> Result<(), GatewayError>
where
    S: EventRecordStore,
{
    bus.subscribe(
        modules::CITIZENSHIP,
        event_types::CITIZEN_REGISTERED,
        CitizenRegisteredHandler::new(directory.clone()),
    )?;
    bus.subscribe_from(
        modules::CITIZENSHIP,
        event_types::DOCUMENT_ISSUED,
        modules::DOCUMENTS,
        DocumentIssuedHandler::new(directory.clone()),
    )?;
    bus.subscribe_from(
        modules::CITIZENSHIP,
        event_types::ADDRESS_CHANGED,
        modules::ADDRESS,
        AddressChangedHandler::new(directory),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use civicgate_events::NewEvent;
    use serde_json::json;

    fn record(event_type: &str, module: &str, id: i64, payload: JsonValue) -> EventRecord {
        NewEvent::new(event_type, module, payload)
            .unwrap()
            .into_record(EventId::new(id).unwrap(), Utc::now())
    }

    async fn directory_with_citizen(citizen_id: i64) -> Arc<InMemoryCitizenDirectory> {
        let directory = Arc::new(InMemoryCitizenDirectory::new());
        directory.register(citizen_id, "Ana Souza").await.unwrap();
        directory
    }

    #[tokio::test]
    async fn document_issued_is_attached_once() {
        let directory = directory_with_citizen(42).await;
        let handler = DocumentIssuedHandler::new(directory.clone());
        let rec = record(
            "document.issued",
            "documents",
            7,
            json!({"citizen_id": 42, "document_type": "passport", "document_id": "P-001"}),
        );

        handler.handle(&rec, &rec.payload).await.unwrap();
        handler.handle(&rec, &rec.payload).await.unwrap();

        let profile = directory.get(42).await.unwrap().unwrap();
        assert_eq!(profile.documents.len(), 1);
        assert_eq!(profile.documents[0].document_id, "P-001");
        assert_eq!(profile.documents[0].event_id.get(), 7);
    }

    #[tokio::test]
    async fn unknown_citizen_is_rejected() {
        let directory = Arc::new(InMemoryCitizenDirectory::new());
        let handler = AddressChangedHandler::new(directory);
        let rec = record("address.changed", "address", 1, json!({"citizen_id": 5, "new_address": "Rua A, 10"}));

        let err = handler.handle(&rec, &rec.payload).await.unwrap_err();
        assert!(matches!(err, HandlerError::Rejected(_)));
    }

    #[tokio::test]
    async fn malformed_payload_is_a_payload_error() {
        let directory = directory_with_citizen(42).await;
        let handler = DocumentIssuedHandler::new(directory);
        let rec = record("document.issued", "documents", 1, json!({"citizen_id": "forty-two"}));

        let err = handler.handle(&rec, &rec.payload).await.unwrap_err();
        assert!(matches!(err, HandlerError::Payload(_)));
    }

    #[tokio::test]
    async fn address_change_replaces_previous_address() {
        let directory = directory_with_citizen(3).await;
        let handler = AddressChangedHandler::new(directory.clone());

        for (id, addr) in [(1, "Rua A, 10"), (2, " Av. Central 200 ")] {
            let rec = record("address.changed", "address", id, json!({"citizen_id": 3, "new_address": addr}));
            handler.handle(&rec, &rec.payload).await.unwrap();
        }

        let profile = directory.get(3).await.unwrap().unwrap();
        assert_eq!(profile.address.as_deref(), Some("Av. Central 200"));
    }
}
