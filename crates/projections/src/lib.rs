//! Read side of the engine.
//!
//! This crate provides the query side of the CQRS pattern:
//! - [`Projection`] trait for folding events into read models
//! - [`ReadModel`] and the [`ReadStore`] that persists and queries them
//! - [`InProcessEventBus`] and [`ChannelEventBus`] delivering committed
//!   events to projections
//! - [`ProjectionProcessor`] for catch-up, rebuild and version checks
//! - [`QueryDispatcher`] with generic [`GetByIdQuery`] and [`ListQuery`]
//!   handlers

pub mod bus;
pub mod error;
pub mod handler;
pub mod memory;
pub mod processor;
pub mod projection;
pub mod query;
pub mod read_model;
pub mod store;

pub use bus::{ChannelEventBus, InProcessEventBus};
pub use error::{ProjectionError, Result};
pub use handler::{
    GetByIdQuery, ListQuery, QueryDispatcher, QueryEnvelope, QueryHandler, QueryResult,
};
pub use memory::InMemoryReadStore;
pub use processor::{CatchUpReport, ProjectionProcessor};
pub use projection::{Projection, ProjectionOutcome, RebuildReport, is_next};
pub use query::{Criteria, DateRange, Page, Pagination, QuerySpec, Sort, SortDirection};
pub use read_model::{ReadModel, ReadModelDocument};
pub use store::{ReadStore, ReadStoreExt};
