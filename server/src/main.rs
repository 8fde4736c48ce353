// Main entry point for the patscope HTTP server

use anyhow::{Context, Result};
use patscope_core::AppConfig;
use patscope_scanner::Pipeline;
use patscope_server::{build_app, init_tracing, AppState};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let dotenv = dotenvy::dotenv();

    init_tracing();
    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }
    tracing::info!("Starting patscope server");

    let config = AppConfig::load_with_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    let pipeline = Pipeline::from_config(&config).context("Failed to build extraction pipeline")?;
    let app = build_app(AppState::new(pipeline), &config.server);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!("Listening on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.server.port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
