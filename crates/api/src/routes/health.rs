use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};
use tracing::warn;

use crate::AppState;

pub fn health_router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}

/// Liveness, no auth required.
async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let engine_state = state.handle.state().await;
    Json(json!({
        "status": "ok",
        "engine": engine_state.to_string(),
    }))
}

/// Readiness: the dedup store and the signal database must both answer.
async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if let Err(e) = state.dedup.ping().await {
        warn!(error = %e, "Readiness check failed: dedup store");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unavailable", "component": "dedup", "error": e.to_string()})),
        );
    }
    if let Err(e) = state.store.count().await {
        warn!(error = %e, "Readiness check failed: signal store");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unavailable", "component": "database", "error": e.to_string()})),
        );
    }
    (StatusCode::OK, Json(json!({"status": "ready"})))
}
