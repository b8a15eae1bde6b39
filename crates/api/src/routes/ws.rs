use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use common::{AdvisorEvent, AdvisorSnapshot};

use crate::{auth::token_matches, AppState};

pub fn ws_router() -> Router<AppState> {
    Router::new().route("/ws/events", get(ws_events_handler))
}

#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// WebSocket endpoint streaming `AdvisorEvent` JSON to the dashboard.
/// Auth via query param `?token=<DASHBOARD_TOKEN>` (header auth not supported
/// in browser WebSocket API).
async fn ws_events_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(q): Query<WsQuery>,
) -> Response {
    let authed = q
        .token
        .as_deref()
        .map(|t| token_matches(t, &state.dashboard_token))
        .unwrap_or(false);

    if !authed {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    let events = state.engine.subscribe();
    let snapshot = state.engine.snapshot().await;
    ws.on_upgrade(move |socket| handle_ws(socket, snapshot, events))
}

async fn handle_ws(
    mut socket: WebSocket,
    snapshot: AdvisorSnapshot,
    mut events: broadcast::Receiver<AdvisorEvent>,
) {
    // Current state first so the client can render before the next event
    let hello = json!({ "type": "snapshot", "snapshot": snapshot }).to_string();
    if socket.send(Message::Text(hello)).await.is_err() {
        return;
    }

    loop {
        match events.recv().await {
            Ok(event) => {
                let text = match serde_json::to_string(&event) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize advisor event");
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(n)) => {
                warn!(dropped = n, "WebSocket event client lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
