//! Process startup wiring.
//!
//! One [`Gateway`] per process: it owns the integration bus (and therefore
//! the subscription registry) and the query service, both over the same
//! store handle. Modules receive the bus through `Gateway::bus()`; nothing
//! reaches it through global state.

use std::sync::Arc;

use tracing::info;

use crate::config::{GatewayConfig, StorageBackend};
use crate::error::GatewayError;
use crate::event_store::{DynEventStore, InMemoryEventStore, PostgresEventStore};
use crate::gateway::IntegrationBus;
use crate::module_handlers::{self, ModuleCollaborators};
use crate::query_service::EventQueryService;

pub struct Gateway {
    bus: Arc<IntegrationBus<DynEventStore>>,
    queries: EventQueryService<DynEventStore>,
}

impl Gateway {
    /// Assemble a gateway over an already constructed store.
    pub fn with_store(store: DynEventStore, config: &GatewayConfig) -> Self {
        let bus = IntegrationBus::new(store.clone()).with_handler_timeout(config.handler_timeout);
        let queries = EventQueryService::new(store)
            .with_limits(config.default_query_limit, config.max_query_limit);

        Self {
            bus: Arc::new(bus),
            queries,
        }
    }

    /// Gateway over a fresh in-memory store (tests/dev), regardless of `config.storage`.
    pub fn in_memory(config: &GatewayConfig) -> Self {
        Self::with_store(Arc::new(InMemoryEventStore::new()), config)
    }

    /// Build the gateway for the configured storage backend.
    ///
    /// For Postgres this connects the pool and applies the schema; a failure
    /// here is a storage error and the process should not start.
    pub async fn connect(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let store: DynEventStore = match &config.storage {
            StorageBackend::InMemory => {
                info!("using in-memory event store");
                Arc::new(InMemoryEventStore::new())
            }
            StorageBackend::Postgres {
                database_url,
                max_connections,
            } => {
                info!(max_connections, "connecting postgres event store");
                let store = PostgresEventStore::connect(database_url, *max_connections).await?;
                store.ensure_schema().await?;
                Arc::new(store)
            }
        };

        Ok(Self::with_store(store, config))
    }

    /// Register every module's event handlers. Call once, before publishing starts.
    pub fn register_modules(&self, collaborators: &ModuleCollaborators) -> Result<(), GatewayError> {
        module_handlers::register_all(self.bus.as_ref(), collaborators)
    }

    pub fn bus(&self) -> Arc<IntegrationBus<DynEventStore>> {
        Arc::clone(&self.bus)
    }

    pub fn queries(&self) -> &EventQueryService<DynEventStore> {
        &self.queries
    }
}

impl core::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Gateway").field("bus", &self.bus).finish_non_exhaustive()
    }
}
