use std::sync::Arc;

use thiserror::Error;

use civicgate_core::EventId;
use civicgate_events::{EventRecord, NewEvent};

use super::query::EventFilter;

/// Event store operation error.
///
/// These are **storage errors** (the backend could not durably write or read),
/// as opposed to validation errors on the publish/query arguments.
///
/// ## Error Categories
///
/// - **Unavailable**: the backend could not be reached (pool closed, IO, timeout)
/// - **Backend**: the backend was reached but rejected or failed the operation
/// - **Corrupt**: a stored row could not be decoded back into an `EventRecord`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    #[error("event store unavailable: {0}")]
    Unavailable(String),

    #[error("event store backend error: {0}")]
    Backend(String),

    #[error("corrupt event record: {0}")]
    Corrupt(String),
}

/// Append-only, queryable log of integration events.
///
/// The `EventRecordStore` is the **durability point** of the integration bus:
/// an event exists (and may be dispatched) only once `insert()` has returned it.
///
/// ## Design Principles
///
/// - **No storage assumptions**: in-memory for tests/dev, Postgres for production
/// - **Append-only**: records are never modified or deleted through this trait
/// - **Store-assigned identity**: `id` and `timestamp` come from the store, never the caller
///
/// ## Ordering
///
/// Implementations must assign ids monotonically and timestamps that never go
/// backwards in insertion order, so `id` order and `timestamp` order agree.
///
/// ## Concurrency
///
/// Implementations must accept concurrent inserts and concurrent reads; query
/// traffic must not block publishers for longer than a single short critical
/// section.
#[async_trait::async_trait]
pub trait EventRecordStore: Send + Sync {
    /// Persist a validated event, assigning its `id` and `timestamp`.
    async fn insert(&self, event: NewEvent) -> Result<EventRecord, EventStoreError>;

    /// Point lookup by id. `Ok(None)` when no such record exists.
    async fn get_by_id(&self, id: EventId) -> Result<Option<EventRecord>, EventStoreError>;

    /// Filtered range query, most recent first, capped at `filter.limit`.
    async fn query(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, EventStoreError>;
}

#[async_trait::async_trait]
impl<S> EventRecordStore for Arc<S>
where
    S: EventRecordStore + ?Sized,
{
    async fn insert(&self, event: NewEvent) -> Result<EventRecord, EventStoreError> {
        (**self).insert(event).await
    }

    async fn get_by_id(&self, id: EventId) -> Result<Option<EventRecord>, EventStoreError> {
        (**self).get_by_id(id).await
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, EventStoreError> {
        (**self).query(filter).await
    }
}
