// [[RARO]]/apps/telemetry-server/src/main.rs
// Purpose: Entry point. Starts the ingestion loops, then serves queries and the live stream.
// Architecture: Application Boot
// Dependencies: Axum, Tower, Tokio

mod config;
mod error;
mod events;
mod fs_manager;
mod hub;
mod models;
mod normalizer;
mod observability;
mod registry;
mod runtime;
mod server;
mod store;
mod tail;
mod tasks;
mod transcript;

use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;
use crate::runtime::TelemetryRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("raro_telemetry=debug,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Initializing RARO Telemetry...");

    let config = TelemetryConfig::from_env();
    let port = config.port;
    let runtime = Arc::new(TelemetryRuntime::new(config));

    let shutdown = CancellationToken::new();
    let workers = runtime.start(shutdown.clone());

    let app = server::router(runtime);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("RARO Telemetry Server listening on http://{}", addr);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            signal.cancel();
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    for worker in workers {
        let _ = worker.await;
    }
    tracing::info!("RARO Telemetry stopped");
    Ok(())
}
