//! Serve command - runs the HTTP API and the data layer forwarder

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::api::{create_router_with_state, AppState};
use crate::config::AppConfig;
use crate::infrastructure::experimentation::DataLayerForwarder;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::observability::{
    create_metrics_router, init_metrics, PrometheusMetrics,
};

/// Run the API server until SIGINT/SIGTERM
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    let log_level = init_logging(&config.logging);

    let state = crate::create_app_state_with_config(&config)
        .await?
        .with_log_level(log_level);

    let metrics = init_metrics(&config.metrics, state.experimentation.platform().as_str());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let forwarder = if config.experimentation.data_layer.enabled {
        let forwarder = DataLayerForwarder::new(
            Arc::clone(&state.data_layer),
            Arc::clone(&state.experimentation),
            &config.experimentation.data_layer.event_prefix,
            Duration::from_millis(config.experimentation.data_layer.poll_interval_ms),
        );
        Some(forwarder.spawn(shutdown_rx))
    } else {
        info!("Data layer forwarding disabled");
        None
    };

    let app = create_app_router(state, metrics, &config.metrics.path);

    let addr = build_socket_addr(&config)?;
    info!("Starting experimentation API on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);

    if let Some(handle) = forwarder {
        if let Err(e) = handle.await {
            warn!("Data layer forwarder ended abnormally: {}", e);
        }
    }

    info!("Experimentation API shutdown complete");

    Ok(())
}

fn create_app_router(
    state: AppState,
    metrics: Option<PrometheusMetrics>,
    metrics_path: &str,
) -> Router {
    let router = create_router_with_state(state);

    match metrics {
        Some(m) => router.merge(create_metrics_router(m, metrics_path)),
        None => router,
    }
}

fn build_socket_addr(config: &AppConfig) -> anyhow::Result<SocketAddr> {
    Ok(SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    )))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
