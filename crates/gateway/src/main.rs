//! CiteWeave API Gateway
//!
//! Entry point: loads configuration, wires the relationship store, the
//! search job client and the seed client, then serves the API.

use citeweave_common::{config::AppConfig, metrics, store::create_store};
use citeweave_gateway::{create_router, spawn_event_logger, AppState};
use citeweave_search::{create_job_client, CitationNetworkClient};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!(
        service = %config.observability.service_name,
        "Starting CiteWeave API Gateway v{}",
        citeweave_common::VERSION
    );

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .set_buckets_for_metric(
                Matcher::Suffix("job_wait_seconds".to_string()),
                metrics::JOB_WAIT_BUCKETS,
            )?
            .install()?;
        metrics::register_metrics();
        info!("Metrics exposed on {}", metrics_addr);
    }

    // Initialize relationship store
    info!(backend = ?config.store.backend, "Connecting to relationship store...");
    let store = create_store(&config.store).await?;

    // Search backend clients
    let jobs = Arc::new(create_job_client(&config)?);
    let seeds = Arc::new(CitationNetworkClient::new(&config.search)?);

    // Create app state
    let (state, events) = AppState::new(config.clone(), store, jobs, seeds);
    spawn_event_logger(events);

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
