use std::process::ExitCode;

use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use metrics_exporter_prometheus::PrometheusHandle;
use server::{Config, Engine, ServerError, telemetry};
use tokio::net::TcpListener;
use tokio::signal;

/// Resolves on SIGINT or SIGTERM. A signal that cannot be watched never
/// fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot watch SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot watch SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

async fn serve<S>(
    store: S,
    backend: &'static str,
    config: &Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), ServerError>
where
    S: EventStore + Clone + 'static,
{
    let engine = Engine::build(store, config)?;
    engine.start().await?;

    let app = server::create_app(server::health_report(backend, &engine), metrics_handle);
    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, backend, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown().await;
    tracing::info!("shut down");
    Ok(())
}

async fn run() -> Result<(), ServerError> {
    let config = Config::from_env()?;
    telemetry::init_tracing(&config)?;
    let metrics_handle = telemetry::install_metrics()?;

    match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresEventStore::connect(url).await?;
            store.run_migrations().await?;
            serve(store, "postgres", &config, metrics_handle).await
        }
        None => serve(InMemoryEventStore::new(), "memory", &config, metrics_handle).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server failed");
            eprintln!("server failed: {e}");
            ExitCode::FAILURE
        }
    }
}
