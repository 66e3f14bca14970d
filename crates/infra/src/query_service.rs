//! Read-side façade over the event record store.
//!
//! The outer API layer uses this service to list, filter and fetch persisted
//! events. It is strictly read-only; there is no way to modify or delete a
//! record through it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use civicgate_core::{EventId, EventType, ModuleName};
use civicgate_events::EventRecord;

use crate::error::GatewayError;
use crate::event_store::{EventFilter, EventRecordStore};

/// Limit applied when a caller does not ask for one.
pub const DEFAULT_QUERY_LIMIT: u32 = 100;

/// Largest limit honoured; bigger requests are clamped.
pub const MAX_QUERY_LIMIT: u32 = 1000;

/// Externally supplied list request (e.g. bound from an HTTP query string).
///
/// Blank strings are treated as "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventListRequest {
    pub event_type: Option<String>,
    pub source_module: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl EventListRequest {
    pub fn by_type(event_type: impl Into<String>, limit: Option<i64>) -> Self {
        Self {
            event_type: Some(event_type.into()),
            limit,
            ..Self::default()
        }
    }

    pub fn by_module(source_module: impl Into<String>, limit: Option<i64>) -> Self {
        Self {
            source_module: Some(source_module.into()),
            limit,
            ..Self::default()
        }
    }
}

/// Read-only event query service.
#[derive(Debug, Clone)]
pub struct EventQueryService<S> {
    store: S,
    default_limit: u32,
    max_limit: u32,
}

impl<S> EventQueryService<S>
where
    S: EventRecordStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            default_limit: DEFAULT_QUERY_LIMIT,
            max_limit: MAX_QUERY_LIMIT,
        }
    }

    /// Override the default and maximum limits (`default` is clamped to `max`).
    pub fn with_limits(mut self, default_limit: u32, max_limit: u32) -> Self {
        self.max_limit = max_limit.max(1);
        self.default_limit = default_limit.clamp(1, self.max_limit);
        self
    }

    pub fn default_limit(&self) -> u32 {
        self.default_limit
    }

    pub fn max_limit(&self) -> u32 {
        self.max_limit
    }

    /// List events matching `request`, most recent first.
    #[instrument(skip(self), err)]
    pub async fn get_events(&self, request: EventListRequest) -> Result<Vec<EventRecord>, GatewayError> {
        let filter = self.to_filter(request)?;
        Ok(self.store.query(&filter).await?)
    }

    /// Fetch a single event. Non-positive ids are a validation error, unknown ids are `Ok(None)`.
    #[instrument(skip(self), err)]
    pub async fn get_event_by_id(&self, id: i64) -> Result<Option<EventRecord>, GatewayError> {
        let id = EventId::new(id)?;
        Ok(self.store.get_by_id(id).await?)
    }

    pub async fn get_events_by_module(
        &self,
        source_module: &str,
        limit: Option<i64>,
    ) -> Result<Vec<EventRecord>, GatewayError> {
        if source_module.trim().is_empty() {
            return Err(GatewayError::validation("source_module must not be empty"));
        }
        self.get_events(EventListRequest::by_module(source_module, limit)).await
    }

    pub async fn get_events_by_type(
        &self,
        event_type: &str,
        limit: Option<i64>,
    ) -> Result<Vec<EventRecord>, GatewayError> {
        if event_type.trim().is_empty() {
            return Err(GatewayError::validation("event_type must not be empty"));
        }
        self.get_events(EventListRequest::by_type(event_type, limit)).await
    }

    fn to_filter(&self, request: EventListRequest) -> Result<EventFilter, GatewayError> {
        let limit = self.resolve_limit(request.limit)?;

        if let (Some(from), Some(to)) = (request.from, request.to) {
            if from > to {
                return Err(GatewayError::validation(format!(
                    "invalid time range: from {} is after to {}",
                    from.to_rfc3339(),
                    to.to_rfc3339()
                )));
            }
        }

        Ok(EventFilter {
            event_type: non_blank(request.event_type).map(EventType::parse).transpose()?,
            source_module: non_blank(request.source_module).map(ModuleName::parse).transpose()?,
            from: request.from,
            to: request.to,
            limit,
        })
    }

    fn resolve_limit(&self, requested: Option<i64>) -> Result<u32, GatewayError> {
        match requested {
            None => Ok(self.default_limit),
            Some(n) if n <= 0 => Err(GatewayError::validation(format!(
                "limit must be positive, got {n}"
            ))),
            Some(n) => Ok(u32::try_from(n).unwrap_or(u32::MAX).min(self.max_limit)),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStore;
    use civicgate_events::NewEvent;
    use serde_json::json;
    use std::sync::Arc;

    async fn seeded() -> EventQueryService<Arc<InMemoryEventStore>> {
        let store = Arc::new(InMemoryEventStore::new());
        for (ty, module) in [
            ("document.issued", "documents"),
            ("address.changed", "address"),
            ("document.issued", "documents"),
            ("citizen.registered", "citizenship"),
        ] {
            store
                .insert(NewEvent::new(ty, module, json!({})).unwrap())
                .await
                .unwrap();
        }
        EventQueryService::new(store)
    }

    #[tokio::test]
    async fn rejects_zero_and_negative_limits() {
        let svc = seeded().await;
        for limit in [0, -1, -100] {
            let err = svc
                .get_events(EventListRequest { limit: Some(limit), ..Default::default() })
                .await
                .unwrap_err();
            assert!(err.is_validation(), "limit {limit} should be rejected");
        }
    }

    #[tokio::test]
    async fn applies_default_and_clamps_large_limits() {
        let svc = seeded().await.with_limits(2, 3);

        let defaulted = svc.get_events(EventListRequest::default()).await.unwrap();
        assert_eq!(defaulted.len(), 2);

        let clamped = svc
            .get_events(EventListRequest { limit: Some(i64::MAX), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(clamped.len(), 3);
    }

    #[tokio::test]
    async fn blank_filter_fields_are_unconstrained() {
        let svc = seeded().await;
        let all = svc
            .get_events(EventListRequest {
                event_type: Some("  ".into()),
                source_module: Some(String::new()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn rejects_inverted_time_range() {
        let svc = seeded().await;
        let now = Utc::now();
        let err = svc
            .get_events(EventListRequest {
                from: Some(now),
                to: Some(now - chrono::Duration::seconds(1)),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn convenience_filters_match_single_field() {
        let svc = seeded().await;

        let docs = svc.get_events_by_type("document.issued", Some(10)).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|r| r.event_type == "document.issued"));
        assert!(docs[0].id > docs[1].id);

        let citizenship = svc.get_events_by_module("citizenship", None).await.unwrap();
        assert_eq!(citizenship.len(), 1);

        assert!(svc.get_events_by_module("", None).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn get_event_by_id_validates_and_passes_through() {
        let svc = seeded().await;

        assert!(svc.get_event_by_id(1).await.unwrap().is_some());
        assert!(svc.get_event_by_id(99).await.unwrap().is_none());
        assert!(svc.get_event_by_id(0).await.unwrap_err().is_validation());
    }
}
