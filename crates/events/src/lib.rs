//! Integration event model, consumer contract and subscription registry.
//!
//! This crate holds the storage-agnostic half of the integration gateway:
//! what an event record looks like, what a handler is, and how handlers are
//! indexed by event type. Persistence and dispatch live in `civicgate-infra`.

pub mod handler;
pub mod record;
pub mod registry;

pub use handler::{EventHandler, FnHandler, HandlerError, handler_fn};
pub use record::{EventRecord, NewEvent};
pub use registry::{Subscription, SubscriptionRegistry};
