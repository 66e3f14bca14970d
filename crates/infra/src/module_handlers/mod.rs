//! Module event handlers (cross-module reactions wired at startup).
//!
//! Each service module owns its handlers and its data-access collaborator.
//! The bus only knows about `EventHandler`s; the typed payload views below
//! are decoded inside each handler, never by the bus.

pub mod citizenship;
pub mod notification;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::event_store::EventRecordStore;
use crate::gateway::IntegrationBus;

pub use citizenship::{
    AddressChangedHandler, CitizenDirectory, CitizenProfile, CitizenRegisteredHandler,
    DocumentIssuedHandler, DocumentRef, InMemoryCitizenDirectory,
};
pub use notification::{InMemoryNotificationOutbox, Notification, NotificationHandler, NotificationOutbox};

/// Well-known event types.
pub mod event_types {
    pub const CITIZEN_REGISTERED: &str = "citizen.registered";
    pub const DOCUMENT_ISSUED: &str = "document.issued";
    pub const ADDRESS_CHANGED: &str = "address.changed";
}

/// Well-known module names.
pub mod modules {
    pub const CITIZENSHIP: &str = "citizenship";
    pub const DOCUMENTS: &str = "documents";
    pub const ADDRESS: &str = "address";
    pub const NOTIFICATION: &str = "notification";
}

/// Payload of `citizen.registered`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitizenRegistered {
    pub citizen_id: i64,
    pub full_name: String,
}

/// Payload of `document.issued`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentIssued {
    pub citizen_id: i64,
    pub document_type: String,
    pub document_id: String,
}

/// Payload of `address.changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressChanged {
    pub citizen_id: i64,
    pub new_address: String,
}

/// Data-access collaborators the module handlers write into.
#[derive(Clone)]
pub struct ModuleCollaborators {
    pub citizens: Arc<dyn CitizenDirectory>,
    pub outbox: Arc<dyn NotificationOutbox>,
}

impl ModuleCollaborators {
    /// In-memory collaborators for tests/dev.
    pub fn in_memory() -> (Self, Arc<InMemoryCitizenDirectory>, Arc<InMemoryNotificationOutbox>) {
        let citizens = Arc::new(InMemoryCitizenDirectory::new());
        let outbox = Arc::new(InMemoryNotificationOutbox::new());
        let collaborators = Self {
            citizens: citizens.clone(),
            outbox: outbox.clone(),
        };
        (collaborators, citizens, outbox)
    }
}

/// Register every module's handlers on `bus`.
///
/// Order matters: within one event type, citizenship handlers run before the
/// notification outbox, so a notice is only queued after the citizen record
/// has been updated (or the update has failed and been logged).
pub fn register_all<S>(bus: &IntegrationBus<S>, collaborators: &ModuleCollaborators) -> Result<(), GatewayError>
where
    S: EventRecordStore,
{
    citizenship::register(bus, collaborators.citizens.clone())?;
    notification::register(bus, collaborators.outbox.clone())?;

    tracing::info!(registrations = bus.registry().len(), "module event handlers registered");
    Ok(())
}
