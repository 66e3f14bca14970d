//! Infrastructure layer: event storage, the integration bus, the read-side
//! query service, configuration and startup wiring.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod event_store;
pub mod gateway;
pub mod module_handlers;
pub mod query_service;


pub use bootstrap::Gateway;
pub use config::{ConfigError, GatewayConfig, LogFormat, StorageBackend};
pub use error::GatewayError;
pub use event_store::{DynEventStore, EventFilter, EventRecordStore, EventStoreError, InMemoryEventStore, PostgresEventStore};
pub use gateway::{DEFAULT_HANDLER_TIMEOUT, IntegrationBus};
pub use query_service::{EventListRequest, EventQueryService};
