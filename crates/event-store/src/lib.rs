//! Append-only event log for the event-sourcing engine.
//!
//! The [`EventStore`] trait is the only persistence seam the write side
//! depends on. Two adapters ship with the crate:
//! - [`InMemoryEventStore`] for tests and single-process deployments
//! - [`PostgresEventStore`] backed by a table with a unique
//!   `(aggregate_id, version)` constraint

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use common::{AggregateId, Issuer};
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use query::EventQuery;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream};
