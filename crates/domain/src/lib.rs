//! Write side of the engine.
//!
//! This crate provides:
//! - [`Aggregate`] / [`DomainEvent`] traits and the [`AggregateRoot`] that
//!   tracks versions, uncommitted changes and soft deletion
//! - [`EventSourcedRepository`] to load aggregates by replay and save them
//!   with an expected-version check
//! - [`Command`], [`CommandHandler`] and [`CommandDispatcher`] for the
//!   load → mutate → save → publish pipeline
//! - the [`EventBus`] seam the pipeline publishes committed events through

pub mod aggregate;
pub mod bus;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod registry;
pub mod repository;

pub use aggregate::{Aggregate, AggregateRoot, DomainEvent, RecordedEvent};
pub use bus::{DeliveryFailure, EventBus, NoopEventBus, PublishReport};
pub use command::{Command, CommandEnvelope, CommandHandler, CommandResult};
pub use dispatcher::CommandDispatcher;
pub use error::{AggregateError, DomainError, ErrorBody, ErrorKind};
pub use gate::{CommitGate, CommitPermit};
pub use registry::{Registry, RegistryError};
pub use repository::EventSourcedRepository;
