//! Store-level filter for event range queries.
//!
//! A filter is a conjunction of optional predicates plus a mandatory `limit`.
//! Any predicate left as `None` is unconstrained, so `EventFilter::latest(n)`
//! returns the `n` most recent events system-wide.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use civicgate_core::{EventType, ModuleName};
use civicgate_events::EventRecord;

/// Filter criteria for [`EventRecordStore::query`](super::EventRecordStore::query).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Exact event type match (optional).
    pub event_type: Option<EventType>,
    /// Exact source module match (optional).
    pub source_module: Option<ModuleName>,
    /// Inclusive lower bound on `timestamp` (optional).
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `timestamp` (optional).
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of records returned.
    pub limit: u32,
}

impl EventFilter {
    /// Unconstrained filter returning the `limit` most recent events.
    pub fn latest(limit: u32) -> Self {
        Self {
            event_type: None,
            source_module: None,
            from: None,
            to: None,
            limit,
        }
    }

    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn with_source_module(mut self, source_module: ModuleName) -> Self {
        self.source_module = Some(source_module);
        self
    }

    pub fn since(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn until(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    /// Whether `record` satisfies every predicate (ignores `limit`).
    pub fn matches(&self, record: &EventRecord) -> bool {
        if let Some(t) = &self.event_type {
            if &record.event_type != t {
                return false;
            }
        }
        if let Some(m) = &self.source_module {
            if &record.source_module != m {
                return false;
            }
        }
        if let Some(from) = self.from {
            if record.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if record.timestamp > to {
                return false;
            }
        }
        true
    }
}
