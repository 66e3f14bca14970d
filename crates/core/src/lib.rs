//! `civicgate-core`: shared primitives for the integration gateway.
//!
//! This crate contains **pure** building blocks (no storage, no async): the
//! identifier and name types every event carries, and the validation error
//! they fail with.

pub mod error;
pub mod id;
pub mod name;

pub use error::{DomainError, DomainResult};
pub use id::EventId;
pub use name::{EventType, ModuleName};
