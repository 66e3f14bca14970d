//! Append-only event record store boundary.
//!
//! This module defines the persistence contract of the integration bus and
//! its two implementations: an in-memory store (tests/dev) and a Postgres
//! store (production).

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use query::EventFilter;
pub use r#trait::{EventRecordStore, EventStoreError};

/// Shared handle to whichever store backend the process was configured with.
pub type DynEventStore = std::sync::Arc<dyn EventRecordStore>;
