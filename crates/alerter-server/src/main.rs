//! Airspace Alerter Server - hazard simulation, route correlation and alert fan-out

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use alerter_server::api;
use alerter_server::config::Config;
use alerter_server::loops;
use alerter_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("alerter_server=debug".parse()?),
        )
        .init();

    tracing::info!("Starting Airspace Alerter Server...");

    let config = Config::from_env();
    let port = config.server_port;
    tracing::info!(
        "Store backend {:?}, proximity threshold {} m, channel '{}'",
        config.store_backend,
        config.proximity_threshold_m,
        config.alerts_channel
    );

    let state = Arc::new(AppState::from_config(config).await?);

    let mut loop_handles = Vec::new();
    loop_handles.push(tokio::spawn(loops::correlation_loop::run_correlation_loop(
        state.clone(),
        state.subscribe_shutdown(),
    )));
    loop_handles.push(tokio::spawn(loops::ttl_reaper_loop::run_ttl_reaper_loop(
        state.clone(),
        state.subscribe_shutdown(),
    )));

    let app = api::routes()
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", err);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
            shutdown_state.shutdown();
        })
        .await?;

    for handle in loop_handles {
        if let Err(err) = handle.await {
            tracing::warn!("Background loop ended abnormally: {}", err);
        }
    }

    tracing::info!("Airspace Alerter Server stopped");
    Ok(())
}
