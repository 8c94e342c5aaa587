mod routes;
mod schemas;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::Context;
use axum::Router;
use log::info;
use tokio::net::TcpListener;
use crate::backend::routes::api_routes;
use crate::backend::state::AppState;
use crate::config::AppConfig;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new().merge(api_routes()).with_state(state)
}

/// Serves the HTTP API until the process is stopped.
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.images_folder)
        .await
        .with_context(|| format!("cannot create {}", config.images_folder.display()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    // The blocking HTTP client refuses to be built on an async worker.
    let state = Arc::new(tokio::task::spawn_blocking(move || AppState::new(config)).await??);
    let app = router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Starting backend server on {addr}");
    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
