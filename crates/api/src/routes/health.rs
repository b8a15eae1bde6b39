use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub fn health_router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}

/// Health check endpoint. No auth required.
async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let engine_state = state.engine.state().await;
    Json(json!({
        "status": "ok",
        "engine": engine_state.to_string(),
    }))
}
