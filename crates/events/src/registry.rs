//! In-memory subscription registry (process-lifetime only).
//!
//! The registry maps an event type to the ordered list of handlers interested
//! in it. Registration order is dispatch order: first registered, first invoked.
//!
//! ## Duplicate registrations
//!
//! Registering the same handler twice for the same `(module, event_type)` is
//! **not** de-duplicated. The handler will run once per registration on every
//! matching publish. Modules should register each handler exactly once during
//! startup.
//!
//! ## Concurrency
//!
//! State sits behind a `RwLock`. [`SubscriptionRegistry::lookup`] returns an
//! owned snapshot, so dispatch never holds the lock while handlers run and a
//! registration racing with a publish only affects later publishes.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use civicgate_core::{EventType, ModuleName};

use crate::{EventHandler, EventRecord};

/// One handler registration.
#[derive(Clone)]
pub struct Subscription {
    module: ModuleName,
    event_type: EventType,
    source_filter: Option<ModuleName>,
    handler: Arc<dyn EventHandler>,
}

impl Subscription {
    pub fn new(module: ModuleName, event_type: EventType, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            module,
            event_type,
            source_filter: None,
            handler,
        }
    }

    /// Only deliver events published by `source_module`.
    pub fn from_source(mut self, source_module: ModuleName) -> Self {
        self.source_filter = Some(source_module);
        self
    }

    pub fn module(&self) -> &ModuleName {
        &self.module
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn source_filter(&self) -> Option<&ModuleName> {
        self.source_filter.as_ref()
    }

    pub fn handler(&self) -> Arc<dyn EventHandler> {
        Arc::clone(&self.handler)
    }

    /// Whether this subscription wants `record` (event type plus optional source predicate).
    pub fn accepts(&self, record: &EventRecord) -> bool {
        if record.event_type != self.event_type {
            return false;
        }
        match &self.source_filter {
            Some(source) => &record.source_module == source,
            None => true,
        }
    }
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("module", &self.module)
            .field("event_type", &self.event_type)
            .field("source_filter", &self.source_filter)
            .finish_non_exhaustive()
    }
}

/// Ordered index of subscriptions keyed by exact event type.
#[derive(Default)]
pub struct SubscriptionRegistry {
    by_type: RwLock<HashMap<EventType, Vec<Subscription>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to the list for `event_type`.
    pub fn register(&self, module: ModuleName, event_type: EventType, handler: Arc<dyn EventHandler>) {
        self.insert(Subscription::new(module, event_type, handler));
    }

    /// Append a handler that only receives `event_type` events published by `source_module`.
    pub fn register_filtered(
        &self,
        module: ModuleName,
        event_type: EventType,
        source_module: ModuleName,
        handler: Arc<dyn EventHandler>,
    ) {
        self.insert(Subscription::new(module, event_type, handler).from_source(source_module));
    }

    fn insert(&self, subscription: Subscription) {
        tracing::debug!(
            module = %subscription.module,
            event_type = %subscription.event_type,
            source_filter = ?subscription.source_filter.as_ref().map(ModuleName::as_str),
            "registering event handler"
        );

        // Writers never panic while holding the lock, so a poisoned guard still
        // protects a consistent map.
        let mut map = self.by_type.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(subscription.event_type.clone())
            .or_default()
            .push(subscription);
    }

    /// Snapshot of the handlers registered for exactly `event_type`, in registration order.
    pub fn lookup(&self, event_type: &EventType) -> Vec<Subscription> {
        let map = self.by_type.read().unwrap_or_else(PoisonError::into_inner);
        map.get(event_type).cloned().unwrap_or_default()
    }

    /// Total number of registrations across all event types.
    pub fn len(&self) -> usize {
        let map = self.by_type.read().unwrap_or_else(PoisonError::into_inner);
        map.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(module, event_type)` pairs for every registration, grouped by event type.
    pub fn registrations(&self) -> Vec<(ModuleName, EventType)> {
        let map = self.by_type.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<(ModuleName, EventType)> = map
            .values()
            .flatten()
            .map(|s| (s.module.clone(), s.event_type.clone()))
            .collect();
        out.sort_by(|a, b| a.1.cmp(&b.1));
        out
    }
}

impl core::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("registrations", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HandlerError, NewEvent, handler_fn};
    use chrono::Utc;
    use civicgate_core::EventId;
    use serde_json::json;

    fn noop() -> Arc<dyn EventHandler> {
        Arc::new(handler_fn(|_, _| async { Ok::<(), HandlerError>(()) }))
    }

    fn ty(s: &str) -> EventType {
        EventType::parse(s).unwrap()
    }

    fn module(s: &str) -> ModuleName {
        ModuleName::parse(s).unwrap()
    }

    #[test]
    fn lookup_preserves_registration_order() {
        let registry = SubscriptionRegistry::new();
        registry.register(module("citizenship"), ty("document.issued"), noop());
        registry.register(module("notification"), ty("document.issued"), noop());
        registry.register(module("audit"), ty("document.issued"), noop());

        let modules: Vec<String> = registry
            .lookup(&ty("document.issued"))
            .iter()
            .map(|s| s.module().to_string())
            .collect();
        assert_eq!(modules, vec!["citizenship", "notification", "audit"]);
    }

    #[test]
    fn lookup_is_exact_match_only() {
        let registry = SubscriptionRegistry::new();
        registry.register(module("citizenship"), ty("document.issued"), noop());

        assert!(registry.lookup(&ty("document")).is_empty());
        assert!(registry.lookup(&ty("document.issued.v2")).is_empty());
        assert_eq!(registry.lookup(&ty("document.issued")).len(), 1);
    }

    #[test]
    fn duplicate_registrations_are_kept() {
        let registry = SubscriptionRegistry::new();
        let handler = noop();
        registry.register(module("citizenship"), ty("address.changed"), handler.clone());
        registry.register(module("citizenship"), ty("address.changed"), handler);

        assert_eq!(registry.lookup(&ty("address.changed")).len(), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn source_filter_restricts_accepted_records() {
        let sub = Subscription::new(module("citizenship"), ty("address.changed"), noop())
            .from_source(module("address"));

        let from_address = NewEvent::new("address.changed", "address", json!({}))
            .unwrap()
            .into_record(EventId::new(1).unwrap(), Utc::now());
        let from_elsewhere = NewEvent::new("address.changed", "urbanism", json!({}))
            .unwrap()
            .into_record(EventId::new(2).unwrap(), Utc::now());

        assert!(sub.accepts(&from_address));
        assert!(!sub.accepts(&from_elsewhere));
    }

    #[test]
    fn registrations_lists_every_pair() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.is_empty());
        registry.register(module("notification"), ty("document.issued"), noop());
        registry.register(module("citizenship"), ty("address.changed"), noop());

        let pairs = registry.registrations();
        assert_eq!(
            pairs,
            vec![
                (module("citizenship"), ty("address.changed")),
                (module("notification"), ty("document.issued")),
            ]
        );
    }
}
