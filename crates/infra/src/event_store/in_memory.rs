use std::sync::{PoisonError, RwLock};

use chrono::Utc;

use civicgate_core::EventId;
use civicgate_events::{EventRecord, NewEvent};

use super::query::EventFilter;
use super::r#trait::{EventRecordStore, EventStoreError};

/// In-memory append-only event store.
///
/// Intended for tests/dev. Records are kept in insertion order, so ids are
/// contiguous from 1 and `records[id - 1]` is the record with that id.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    records: RwLock<Vec<EventRecord>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted records.
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> EventStoreError {
    EventStoreError::Unavailable("lock poisoned".to_string())
}

#[async_trait::async_trait]
impl EventRecordStore for InMemoryEventStore {
    async fn insert(&self, event: NewEvent) -> Result<EventRecord, EventStoreError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;

        let id = EventId::new(records.len() as i64 + 1)
            .map_err(|e| EventStoreError::Backend(e.to_string()))?;

        // Wall clocks can step backwards; never let a later id carry an earlier timestamp.
        let now = Utc::now();
        let timestamp = match records.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };

        let record = event.into_record(id, timestamp);
        records.push(record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: EventId) -> Result<Option<EventRecord>, EventStoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let idx = (id.get() - 1) as usize;
        Ok(records.get(idx).cloned())
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, EventStoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;

        // Insertion order is (timestamp, id) ascending, so walking backwards is
        // timestamp DESC with id DESC as tie-breaker.
        Ok(records
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civicgate_core::{EventType, ModuleName};
    use serde_json::json;

    fn new_event(event_type: &str, module: &str) -> NewEvent {
        NewEvent::new(event_type, module, json!({"k": event_type})).unwrap()
    }

    #[tokio::test]
    async fn insert_assigns_contiguous_ids_and_ordered_timestamps() {
        let store = InMemoryEventStore::new();
        let a = store.insert(new_event("a.one", "m")).await.unwrap();
        let b = store.insert(new_event("a.two", "m")).await.unwrap();
        let c = store.insert(new_event("a.three", "m")).await.unwrap();

        assert_eq!([a.id.get(), b.id.get(), c.id.get()], [1, 2, 3]);
        assert!(a.timestamp <= b.timestamp && b.timestamp <= c.timestamp);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn poisoned_store_still_reports_its_length() {
        let store = InMemoryEventStore::new();
        store.insert(new_event("document.issued", "documents")).await.unwrap();

        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = store.records.write().unwrap();
            panic!("writer died");
        }));

        assert!(store.records.is_poisoned());
        assert_eq!(store.len(), 1);
        assert!(!store.is_empty());
        assert!(matches!(
            store.insert(new_event("document.issued", "documents")).await,
            Err(EventStoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn get_by_id_finds_inserted_record() {
        let store = InMemoryEventStore::new();
        let rec = store.insert(new_event("document.issued", "documents")).await.unwrap();

        assert_eq!(store.get_by_id(rec.id).await.unwrap(), Some(rec.clone()));
        assert_eq!(store.get_by_id(rec.id.next()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn query_returns_most_recent_first_and_respects_limit() {
        let store = InMemoryEventStore::new();
        for i in 0..5 {
            let module = if i % 2 == 0 { "documents" } else { "address" };
            store.insert(new_event("x.y", module)).await.unwrap();
        }

        let latest = store.query(&EventFilter::latest(3)).await.unwrap();
        let ids: Vec<i64> = latest.iter().map(|r| r.id.get()).collect();
        assert_eq!(ids, vec![5, 4, 3]);

        let docs = store
            .query(&EventFilter::latest(10).with_source_module(ModuleName::parse("documents").unwrap()))
            .await
            .unwrap();
        let ids: Vec<i64> = docs.iter().map(|r| r.id.get()).collect();
        assert_eq!(ids, vec![5, 3, 1]);
    }

    #[tokio::test]
    async fn query_on_unknown_type_is_empty() {
        let store = InMemoryEventStore::new();
        store.insert(new_event("known.type", "m")).await.unwrap();

        let none = store
            .query(&EventFilter::latest(10).with_event_type(EventType::parse("other.type").unwrap()))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    const TYPES: [&str; 3] = ["citizen.registered", "document.issued", "address.changed"];
    const MODULES: [&str; 3] = ["citizenship", "documents", "address"];

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig {
            cases: 128,
            ..proptest::prelude::ProptestConfig::default()
        })]

        /// Property: a query returns exactly the matching records, newest first,
        /// truncated to the limit.
        #[test]
        fn query_agrees_with_a_linear_scan(
            inserts in proptest::collection::vec((0usize..3, 0usize..3), 0..40),
            type_filter in proptest::option::of(0usize..3),
            module_filter in proptest::option::of(0usize..3),
            limit in 1u32..50,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let store = InMemoryEventStore::new();

            let all: Vec<EventRecord> = rt.block_on(async {
                let mut all = Vec::new();
                for (t, m) in &inserts {
                    all.push(store.insert(new_event(TYPES[*t], MODULES[*m])).await.unwrap());
                }
                all
            });

            let mut filter = EventFilter::latest(limit);
            if let Some(t) = type_filter {
                filter = filter.with_event_type(EventType::parse(TYPES[t]).unwrap());
            }
            if let Some(m) = module_filter {
                filter = filter.with_source_module(ModuleName::parse(MODULES[m]).unwrap());
            }

            let expected: Vec<EventRecord> = all
                .iter()
                .rev()
                .filter(|r| type_filter.is_none_or(|t| r.event_type == TYPES[t]))
                .filter(|r| module_filter.is_none_or(|m| r.source_module == MODULES[m]))
                .take(limit as usize)
                .cloned()
                .collect();
            let got = rt.block_on(store.query(&filter)).unwrap();

            proptest::prop_assert_eq!(got, expected);
        }
    }
}
