use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::api::{self, AppState, SharedState};
use crate::config::AppConfig;
use crate::github::GitHubClient;
use crate::planner::ModelClient;

/// Build the application router. The event stream is consumed by browser
/// frontends on other origins, so CORS is wide open.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the server and block until shutdown.
pub async fn start_server(config: AppConfig) -> Result<()> {
    std::fs::create_dir_all(&config.workspace_root)
        .context("Failed to create workspace root")?;

    let source_control = Arc::new(GitHubClient::new(
        &config.github_token,
        &config.github_api_url,
    ));
    let model = Arc::new(ModelClient::new(
        &config.model_api_key,
        &config.model_api_url,
        &config.model,
    ));

    let addr = format!("0.0.0.0:{}", config.port);
    let state = Arc::new(AppState {
        config,
        source_control,
        model,
    });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!(addr = %listener.local_addr()?, "backspace listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Shutting down");
}
