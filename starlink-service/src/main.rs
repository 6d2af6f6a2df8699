use std::net::SocketAddr;

use anyhow::{Context, Result};
use starlink_service::{
    api::{self, AppState},
    config::AppConfig,
    metrics_server, observability, store,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let store = store::open_store(&cfg).await?;

    let addr: SocketAddr = cfg
        .http
        .bind_addr
        .parse()
        .with_context(|| format!("invalid http.bind_addr '{}'", cfg.http.bind_addr))?;
    if cfg.http.auth_bearer_token.is_none() {
        tracing::warn!("http.auth_bearer_token is not set; /api routes are unauthenticated");
    }

    let app = api::router(
        AppState::new(store, cfg.http.auth_bearer_token.clone()),
        cfg.http.max_body_bytes,
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "starlink usage API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
