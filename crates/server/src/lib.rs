//! Hosting process for the event-sourcing engine.
//!
//! Loads configuration from the environment, installs structured logging
//! and a Prometheus recorder, picks an event store backend and wires the
//! shipping and accounts aggregates into one [`Engine`]. The HTTP surface
//! is operational only: `/health` and `/metrics`.

pub mod config;
pub mod engine;
pub mod error;
pub mod routes;
pub mod telemetry;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use engine::Engine;
pub use error::ServerError;
use routes::health::HealthReport;

/// Builds the health report for an engine running on `event_store`.
pub fn health_report<S>(event_store: &'static str, engine: &Engine<S>) -> HealthReport
where
    S: EventStore + Clone + 'static,
{
    HealthReport {
        status: "ok",
        event_store,
        projections: engine.projection_names(),
        command_routes: engine.command_routes(),
        query_types: engine.query_types(),
    }
}

pub fn create_app(health: HealthReport, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .with_state(Arc::new(health))
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
