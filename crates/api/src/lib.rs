mod auth;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use engine::EngineHandle;

/// Shared application state injected into every route handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub dashboard_token: Arc<str>,
}

impl AppState {
    pub fn new(engine: EngineHandle, dashboard_token: impl Into<String>) -> Self {
        Self {
            engine,
            dashboard_token: Arc::from(dashboard_token.into()),
        }
    }
}

/// The full dashboard router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    Router::new()
        .merge(routes::api_router(state.clone()))
        .merge(routes::ws_router())
        .merge(routes::health_router())
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(cors)
}

/// Bind and serve the dashboard API until the listener fails.
pub async fn serve(state: AppState, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Dashboard API listening");
    axum::serve(listener, router(state)).await
}
