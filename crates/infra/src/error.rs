//! Errors surfaced at the gateway's public boundary (publish, subscribe, query).

use thiserror::Error;

use civicgate_core::DomainError;

use crate::event_store::EventStoreError;

/// Error returned by [`IntegrationBus`](crate::gateway::IntegrationBus) and
/// [`EventQueryService`](crate::query_service::EventQueryService).
///
/// Handler failures never appear here: they are contained inside the
/// bus and never reach a publisher.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Malformed arguments, rejected before any storage or dispatch work.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The event store could not durably write or read.
    #[error(transparent)]
    Storage(#[from] EventStoreError),
}

impl GatewayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<DomainError> for GatewayError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
        }
    }
}
