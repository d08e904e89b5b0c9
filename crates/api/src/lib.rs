mod auth;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use common::Result;
use dedup::DedupStore;
use engine::{OrchestratorHandle, SignalStore};

/// Shared application state injected into every route handler.
#[derive(Clone)]
pub struct AppState {
    pub store: SignalStore,
    pub handle: OrchestratorHandle,
    /// Pinged by `/readyz`.
    pub dedup: Arc<dyn DedupStore>,
    pub dashboard_token: Arc<str>,
}

/// All routes with state and CORS applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    Router::new()
        .merge(routes::api_router(state.clone()))
        .merge(routes::health_router())
        .with_state(state)
        .layer(cors)
}

/// Bind and serve the HTTP API until the listener fails.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP API listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
