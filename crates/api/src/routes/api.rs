use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::{auth::require_auth, AppState};

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 500;

pub fn api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/signals", get(get_signals))
        .route("/api/status", get(get_status))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

#[derive(Deserialize)]
struct SignalsQuery {
    limit: Option<u32>,
}

/// Most recent accepted signals, newest first.
async fn get_signals(
    State(state): State<AppState>,
    Query(q): Query<SignalsQuery>,
) -> (StatusCode, Json<Value>) {
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let signals = match state.store.recent(limit).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to load recent signals");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "database unavailable"})),
            );
        }
    };
    let total = state.store.count().await.unwrap_or(signals.len() as i64);

    (
        StatusCode::OK,
        Json(json!({ "signals": signals, "total": total, "limit": limit })),
    )
}

async fn get_status(State(state): State<AppState>) -> Json<Value> {
    let engine_state = state.handle.state().await;
    Json(json!({
        "engine": engine_state.to_string(),
        "stats": state.handle.stats(),
    }))
}
