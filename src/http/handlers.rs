use super::state::AppState;
use crate::session::SessionState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// GET /session/status
/// Latest state transition of the voice session
pub async fn get_session_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.status.borrow().clone();
    (StatusCode::OK, Json(status))
}

/// POST /session/stop
/// Ask the running voice session to stop
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.status.borrow().clone();

    match status.state {
        SessionState::Connecting | SessionState::Active => {
            info!("Stop requested over HTTP for session: {}", status.session_id);
            state.stop.notify_one();
            (
                StatusCode::ACCEPTED,
                Json(StopSessionResponse {
                    session_id: status.session_id.clone(),
                    status: "stopping".to_string(),
                    message: format!("Stopping session {}", status.session_id),
                }),
            )
                .into_response()
        }
        other => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("Session {} is {}", status.session_id, other),
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
