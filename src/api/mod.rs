//! HTTP and WebSocket surface
//!
//! Thin layer over [`CommandExecutor`]: REST routes for listings and
//! one-shot actions, WebSocket upgrades for streaming and interactive
//! sessions. No authentication; deployments front this with their own
//! proxy. CORS is wide open for the same reason.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::Result;
use crate::fleet::CommandExecutor;

mod handlers;
mod ws;

pub use ws::bind_socket;

/// Assemble the full route table around a shared executor.
#[must_use]
pub fn build_router(executor: Arc<CommandExecutor>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/machines", get(handlers::list_machines))
        .route("/containers", get(handlers::list_containers))
        .route("/images", get(handlers::list_images))
        .route("/container/action", get(handlers::container_action))
        .route("/container/create", post(handlers::create_container))
        .route(
            "/config",
            get(handlers::get_config).post(handlers::update_config),
        )
        .route("/config/reload", post(handlers::reload_config))
        .route("/container/stream", get(handlers::container_stream))
        .route("/image/stream", get(handlers::image_stream))
        .route("/machine/exec", get(handlers::machine_exec))
        .route("/container/exec", get(handlers::container_exec))
        .route("/container/log", get(handlers::container_log))
        .with_state(executor)
        .layer(CorsLayer::permissive())
}

/// Bind and serve until the process is stopped.
///
/// # Errors
///
/// Returns an error if the listen address cannot be bound or the server
/// fails while running.
pub async fn serve(listen: &str, executor: Arc<CommandExecutor>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(listen = %listen, "Serving fleet API");
    axum::serve(listener, build_router(executor)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;

    // ============== Router Construction ==============

    #[tokio::test]
    async fn test_router_builds_with_empty_fleet() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();
        let executor = Arc::new(CommandExecutor::new(store).await);
        let _router = build_router(executor);
    }
}
