use std::future::Future;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::EventRecord;

/// Failure reported by an event handler.
///
/// Handler errors never reach the publisher: the bus logs them with the event
/// id, event type and failing module, then moves on to the next handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The payload could not be decoded into the handler's typed view.
    #[error("payload rejected: {0}")]
    Payload(String),

    /// The event was well-formed but the consumer refused it
    /// (e.g. it references a citizen the module does not know).
    #[error("event rejected: {0}")]
    Rejected(String),

    /// Any other consumer-side failure (downstream IO, poisoned state, ...).
    #[error("handler failed: {0}")]
    Failed(String),
}

impl HandlerError {
    pub fn payload(msg: impl Into<String>) -> Self {
        Self::Payload(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(value: serde_json::Error) -> Self {
        Self::Payload(value.to_string())
    }
}

/// Consumer side of the integration bus.
///
/// A handler is registered under a module name for one event type and is
/// invoked once per matching publish, receiving the persisted record and its
/// payload. Handlers may perform IO (typically updating the owning module's
/// data) but should finish in bounded time; the bus abandons an invocation
/// that exceeds its configured timeout.
///
/// The timeout can only fire while the handler is suspended at an `.await`.
/// Synchronous blocking (CPU-heavy work, blocking IO, `std::thread::sleep`)
/// stalls the publisher past the timeout; run it through
/// `tokio::task::spawn_blocking` and await the join handle instead.
///
/// Delivery is at-most-once per registration: there is no retry after a
/// failure and no replay of events published before the handler subscribed.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, record: &EventRecord, payload: &JsonValue) -> Result<(), HandlerError>;
}

#[async_trait::async_trait]
impl<H> EventHandler for Arc<H>
where
    H: EventHandler + ?Sized,
{
    async fn handle(&self, record: &EventRecord, payload: &JsonValue) -> Result<(), HandlerError> {
        (**self).handle(record, payload).await
    }
}

/// Adapter turning an async closure into an [`EventHandler`].
///
/// Built with [`handler_fn`]. The closure receives owned copies of the
/// record and payload so the returned future does not borrow from the bus.
pub struct FnHandler<F> {
    f: F,
}

/// Wrap `f` as an event handler.
///
/// ```ignore
/// bus.subscribe("citizenship", "document.issued", handler_fn(|record, payload| async move {
///     tracing::info!(event_id = %record.id, "document issued: {payload}");
///     Ok(())
/// }))?;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(EventRecord, JsonValue) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait::async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(EventRecord, JsonValue) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, record: &EventRecord, payload: &JsonValue) -> Result<(), HandlerError> {
        (self.f)(record.clone(), payload.clone()).await
    }
}

impl<F> core::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}
