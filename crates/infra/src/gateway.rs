//! Integration gateway: durable publish plus isolated synchronous fan-out.
//!
//! This module implements the **publish protocol** that lets otherwise
//! isolated service modules (citizenship, documents, address, notification, ...)
//! react to each other's events without compile-time dependencies.
//!
//! ## Publish Flow
//!
//! ```text
//! publish(event_type, payload, source_module)
//!   ↓
//! 1. Validate arguments            → GatewayError::Validation, nothing stored
//!   ↓
//! 2. EventRecordStore::insert      → GatewayError::Storage, no handler runs
//!   ↓
//! 3. SubscriptionRegistry::lookup  (snapshot, registration order)
//!   ↓
//! 4. Invoke each accepting handler (own task, bounded by handler_timeout)
//!      error / panic / timeout → logged, next handler still runs
//!   ↓
//! 5. Return the persisted EventRecord
//! ```
//!
//! There is no partial-publish state: either the record is stored and
//! dispatch is attempted, or nothing is stored and nobody is notified.
//!
//! ## Delivery Guarantees
//!
//! - **At-most-once per registration**: no retry, no backoff
//! - **No replay**: a handler only sees events published after it subscribed;
//!   consumers catch up through the query service
//! - **Ordered per event type**: handlers run one after another, in
//!   registration order, and `publish` returns only after all were attempted

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{Instrument, Span, debug, instrument, warn};

use civicgate_core::{EventType, ModuleName};
use civicgate_events::{EventHandler, EventRecord, HandlerError, NewEvent, Subscription, SubscriptionRegistry};

use crate::error::GatewayError;
use crate::event_store::EventRecordStore;

/// Default upper bound on a single handler invocation.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a single handler invocation did not complete successfully.
///
/// Internal to dispatch: logged and then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HandlerFailure {
    Error(HandlerError),
    Panicked(String),
    TimedOut(Duration),
}

impl core::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HandlerFailure::Error(e) => write!(f, "{e}"),
            HandlerFailure::Panicked(msg) => write!(f, "handler panicked: {msg}"),
            HandlerFailure::TimedOut(d) => write!(f, "handler timed out after {}ms", d.as_millis()),
        }
    }
}

/// Outcome counts of one dispatch round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DispatchSummary {
    delivered: usize,
    failed: usize,
    skipped: usize,
}

/// Process-local integration bus.
///
/// Owns the [`SubscriptionRegistry`] and shares the event store with the
/// query service. Construct one per process at startup and pass an
/// `Arc<IntegrationBus<_>>` to every module that publishes or subscribes.
pub struct IntegrationBus<S> {
    store: S,
    registry: SubscriptionRegistry,
    handler_timeout: Duration,
}

impl<S> IntegrationBus<S>
where
    S: EventRecordStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            registry: SubscriptionRegistry::new(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Bound each handler invocation by `timeout` (treated as an isolated failure when exceeded).
    ///
    /// The timeout is only observed at `.await` points. A handler that blocks
    /// its worker thread is not interrupted; blocking work belongs in
    /// `tokio::task::spawn_blocking`.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn handler_timeout(&self) -> Duration {
        self.handler_timeout
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Register `handler` under `module` for every future `event_type` publish.
    ///
    /// Registering the same handler twice means it runs twice per event.
    pub fn subscribe<H>(&self, module: &str, event_type: &str, handler: H) -> Result<(), GatewayError>
    where
        H: EventHandler + 'static,
    {
        let module = ModuleName::parse(module)?;
        let event_type = EventType::parse(event_type)?;
        self.registry.register(module, event_type, Arc::new(handler));
        Ok(())
    }

    /// Like [`subscribe`](Self::subscribe), but only for events published by `source_module`.
    pub fn subscribe_from<H>(
        &self,
        module: &str,
        event_type: &str,
        source_module: &str,
        handler: H,
    ) -> Result<(), GatewayError>
    where
        H: EventHandler + 'static,
    {
        let module = ModuleName::parse(module)?;
        let event_type = EventType::parse(event_type)?;
        let source_module = ModuleName::parse(source_module)?;
        self.registry
            .register_filtered(module, event_type, source_module, Arc::new(handler));
        Ok(())
    }

    /// Durably record an event, then notify every registered handler.
    ///
    /// Fails only when the arguments are invalid or the store rejects the
    /// insert. Handler failures are logged and never change the result; a
    /// successful return is not proof that any handler side effect happened.
    #[instrument(
        skip(self, payload),
        fields(event_id = tracing::field::Empty),
        err
    )]
    pub async fn publish(
        &self,
        event_type: &str,
        payload: JsonValue,
        source_module: &str,
    ) -> Result<EventRecord, GatewayError> {
        let event = NewEvent::new(event_type, source_module, payload)?;

        let record = self.store.insert(event).await?;
        Span::current().record("event_id", record.id.get());

        let subscriptions = self.registry.lookup(&record.event_type);
        let summary = self.dispatch(&record, subscriptions).await;

        debug!(
            event_id = %record.id,
            event_type = %record.event_type,
            delivered = summary.delivered,
            failed = summary.failed,
            skipped = summary.skipped,
            "event dispatched"
        );

        Ok(record)
    }

    async fn dispatch(&self, record: &EventRecord, subscriptions: Vec<Subscription>) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for subscription in subscriptions {
            if !subscription.accepts(record) {
                summary.skipped += 1;
                continue;
            }

            match self.invoke(&subscription, record).await {
                Ok(()) => summary.delivered += 1,
                Err(failure) => {
                    summary.failed += 1;
                    warn!(
                        event_id = %record.id,
                        event_type = %record.event_type,
                        source_module = %record.source_module,
                        handler_module = %subscription.module(),
                        reason = %failure,
                        "event handler failed; continuing dispatch"
                    );
                }
            }
        }

        summary
    }

    /// Run one handler in its own task, inside the `publish` span, so a panic or a hang stays contained.
    async fn invoke(&self, subscription: &Subscription, record: &EventRecord) -> Result<(), HandlerFailure> {
        let handler = subscription.handler();
        let record = record.clone();
        let mut task = tokio::spawn(
            async move { handler.handle(&record, &record.payload).await }.in_current_span(),
        );

        match tokio::time::timeout(self.handler_timeout, &mut task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(HandlerFailure::Error(e)),
            Ok(Err(join_err)) => Err(HandlerFailure::Panicked(join_err.to_string())),
            Err(_) => {
                task.abort();
                Err(HandlerFailure::TimedOut(self.handler_timeout))
            }
        }
    }
}

impl<S> core::fmt::Debug for IntegrationBus<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IntegrationBus")
            .field("registry", &self.registry)
            .field("handler_timeout", &self.handler_timeout)
            .finish_non_exhaustive()
    }
}
