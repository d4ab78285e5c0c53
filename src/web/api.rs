//! Axum routes: the observer WebSocket and the status endpoint.

use crate::communication::broadcast::StateBroadcaster;
use crate::session::SessionHandle;
use crate::web::observer::observer_socket;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

pub struct AppStateInner {
    pub session: SessionHandle,
    pub broadcaster: StateBroadcaster,
}

pub type AppState = Arc<AppStateInner>;

fn json_error(message: &str, status: StatusCode) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// Creates the Axum router with every endpoint.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(observer_socket))
        .route("/api/v1/status", get(get_status))
        .with_state(state)
}

/// Handler for the current session state, emulated time and pin levels.
async fn get_status(State(state): State<AppState>) -> Response {
    match state.session.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            tracing::error!("Status request failed: {}", e);
            json_error("session manager unavailable", StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
