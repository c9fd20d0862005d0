use event_store::EventStoreError;
use projections::ProjectionError;
use thiserror::Error;

use crate::config::ConfigError;

/// Failures while starting or running the server process.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("tracing subscriber: {0}")]
    Tracing(#[from] tracing_subscriber::util::TryInitError),

    #[error("metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("event store: {0}")]
    Store(#[from] EventStoreError),

    #[error("registration: {0}")]
    Registry(#[from] domain::RegistryError),

    #[error("projections: {0}")]
    Projection(#[from] ProjectionError),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}
