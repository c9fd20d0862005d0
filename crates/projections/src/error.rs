//! Projection error types.

use domain::{DomainError, RegistryError};
use thiserror::Error;

/// Errors that can occur during projection processing and read-store access.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// Failed to (de)serialize an event payload or a read model.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A projection-specific error.
    #[error("Projection error: {0}")]
    Projection(String),

    /// An event arrived for a stream whose earlier versions never reached
    /// the read model. Cleared by a catch-up or a rebuild.
    #[error("Version gap for {aggregate_id}: expected {expected}, got {received}")]
    VersionGap {
        aggregate_id: String,
        expected: event_store::Version,
        received: event_store::Version,
    },

    /// No projection with this name is registered.
    #[error("Unknown projection: {0}")]
    UnknownProjection(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ProjectionError {
    pub fn projection(message: impl Into<String>) -> Self {
        ProjectionError::Projection(message.into())
    }
}

impl From<ProjectionError> for DomainError {
    fn from(e: ProjectionError) -> Self {
        match e {
            ProjectionError::EventStore(e) => e.into(),
            ProjectionError::Registry(e) => e.into(),
            other => DomainError::Projection(other.to_string()),
        }
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
