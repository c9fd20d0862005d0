//! Tracing subscriber and Prometheus recorder setup.

use metrics::Unit;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{Config, LogFormat};

const COMMAND_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0];

/// Installs the global subscriber. An unparsable `RUST_LOG` falls back to
/// `info`.
pub fn init_tracing(config: &Config) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer()).try_init(),
    }
}

/// Installs the global Prometheus recorder and describes the engine's
/// metrics. Fails if a recorder is already installed.
pub fn install_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("command_duration_seconds".to_string()),
            COMMAND_BUCKETS,
        )?
        .install_recorder()?;

    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    metrics::describe_counter!("commands_handled_total", "Commands that committed or were no-ops");
    metrics::describe_counter!("commands_failed_total", "Commands rejected, by error kind");
    metrics::describe_histogram!(
        "command_duration_seconds",
        Unit::Seconds,
        "Time from command receipt to result"
    );
    metrics::describe_counter!(
        "repository_concurrency_conflicts_total",
        "Saves rejected because the aggregate moved on"
    );
    metrics::describe_counter!("events_published_total", "Committed events handed to the bus");
    metrics::describe_counter!("projection_events_applied_total", "Events folded into read models");
    metrics::describe_counter!(
        "projection_events_skipped_total",
        "Redelivered events ignored by version"
    );
    metrics::describe_counter!("projection_failures_total", "Projection errors, by projection");
    metrics::describe_counter!("queries_executed_total", "Queries dispatched");
}
