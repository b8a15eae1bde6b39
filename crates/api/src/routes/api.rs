use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::info;

use common::{AdvisorSnapshot, EngineCommand, PortfolioState, StrategyParams};

use crate::{auth::require_auth, AppState};

pub fn api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/advice", get(get_advice))
        .route("/api/params", get(get_params))
        .route("/api/portfolio", post(post_portfolio))
        .route("/api/optimize", post(post_optimize))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

// ─── Reads ────────────────────────────────────────────────────────────────────

async fn get_status(State(state): State<AppState>) -> Json<AdvisorSnapshot> {
    Json(state.engine.snapshot().await)
}

async fn get_advice(State(state): State<AppState>) -> Json<Value> {
    let snap = state.engine.snapshot().await;
    Json(json!({
        "advice": snap.advice,
        "signal": snap.technical.as_ref().map(|t| t.signal),
        "sentiment": snap.sentiment.as_ref().and_then(|s| s.available_score()),
        "price": snap.price,
        "updated_at": snap.updated_at,
    }))
}

async fn get_params(State(state): State<AppState>) -> Json<StrategyParams> {
    Json(state.engine.snapshot().await.params)
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn post_portfolio(
    State(state): State<AppState>,
    Json(portfolio): Json<PortfolioState>,
) -> (StatusCode, Json<Value>) {
    let valid = |v: f64| v.is_finite() && v >= 0.0;
    if !valid(portfolio.holdings) || !valid(portfolio.cash) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "holdings and cash must be non-negative numbers"})),
        );
    }
    info!(holdings = portfolio.holdings, cash = portfolio.cash, "Portfolio update via API");
    state.engine.send(EngineCommand::SetPortfolio(portfolio)).await;
    (StatusCode::ACCEPTED, Json(json!({"status": "accepted"})))
}

async fn post_optimize(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    info!("Optimization requested via API");
    state.engine.send(EngineCommand::Optimize).await;
    (StatusCode::ACCEPTED, Json(json!({"status": "queued"})))
}
