//! Notification outbox: queues a citizen-facing notice per relevant event.
//!
//! Actual email/SMS delivery happens elsewhere; this module only records what
//! should be sent, keyed by the originating event so a duplicate delivery does
//! not produce a second notice.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use civicgate_core::EventId;
use civicgate_events::{EventHandler, EventRecord, HandlerError};

use super::{AddressChanged, DocumentIssued, event_types, modules};
use crate::error::GatewayError;
use crate::event_store::EventRecordStore;
use crate::gateway::IntegrationBus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub citizen_id: i64,
    pub message: String,
    pub event_id: EventId,
}

#[async_trait::async_trait]
pub trait NotificationOutbox: Send + Sync {
    /// Queue `notification`; returns `false` if one for the same event was already queued.
    async fn enqueue(&self, notification: Notification) -> Result<bool, HandlerError>;
}

#[derive(Debug, Default)]
pub struct InMemoryNotificationOutbox {
    queued: RwLock<Vec<Notification>>,
}

impl InMemoryNotificationOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Vec<Notification> {
        self.queued.read().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl NotificationOutbox for InMemoryNotificationOutbox {
    async fn enqueue(&self, notification: Notification) -> Result<bool, HandlerError> {
        let mut queued = self
            .queued
            .write()
            .map_err(|_| HandlerError::failed("notification outbox lock poisoned"))?;
        if queued.iter().any(|n| n.event_id == notification.event_id) {
            return Ok(false);
        }
        queued.push(notification);
        Ok(true)
    }
}

/// Turns `document.issued` / `address.changed` into queued notices.
pub struct NotificationHandler {
    outbox: Arc<dyn NotificationOutbox>,
}

impl NotificationHandler {
    pub fn new(outbox: Arc<dyn NotificationOutbox>) -> Self {
        Self { outbox }
    }

    fn compose(record: &EventRecord) -> Result<Notification, HandlerError> {
        let (citizen_id, message) = match record.event_type.as_str() {
            event_types::DOCUMENT_ISSUED => {
                let ev: DocumentIssued = record.payload_as()?;
                (
                    ev.citizen_id,
                    format!("Your {} ({}) has been issued.", ev.document_type, ev.document_id),
                )
            }
            event_types::ADDRESS_CHANGED => {
                let ev: AddressChanged = record.payload_as()?;
                (
                    ev.citizen_id,
                    format!("Your registered address is now {}.", ev.new_address.trim()),
                )
            }
            other => {
                return Err(HandlerError::rejected(format!(
                    "no notification template for {other}"
                )));
            }
        };

        Ok(Notification {
            citizen_id,
            message,
            event_id: record.id,
        })
    }
}

#[async_trait::async_trait]
impl EventHandler for NotificationHandler {
    async fn handle(&self, record: &EventRecord, _payload: &JsonValue) -> Result<(), HandlerError> {
        let notification = Self::compose(record)?;
        if !self.outbox.enqueue(notification).await? {
            tracing::debug!(event_id = %record.id, "notification already queued");
        }
        Ok(())
    }
}

/// Register the notification module's handlers.
pub fn register<S>(bus: &IntegrationBus<S>, outbox: Arc<dyn NotificationOutbox>) -> Result<(), GatewayError>
where
    S: EventRecordStore,
{
    let handler = Arc::new(NotificationHandler::new(outbox));
    bus.subscribe(modules::NOTIFICATION, event_types::DOCUMENT_ISSUED, handler.clone())?;
    bus.subscribe(modules::NOTIFICATION, event_types::ADDRESS_CHANGED, handler)?;
    Ok(())
}
