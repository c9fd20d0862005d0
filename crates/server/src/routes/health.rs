//! Liveness and wiring report.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Static description of what the running engine was built with.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub event_store: &'static str,
    pub projections: Vec<&'static str>,
    pub command_routes: Vec<String>,
    pub query_types: Vec<String>,
}

/// GET /health
pub async fn check(State(report): State<Arc<HealthReport>>) -> Json<HealthReport> {
    Json(report.as_ref().clone())
}
