use super::state::AppState;
use crate::automation::{ClickTarget, CommandResult, ScreenshotPayload};
use crate::session::SessionReport;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Text command, e.g. "click 10 20"
    pub command: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopSessionResponse {
    pub status: String,
    pub report: Option<SessionReport>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /commands
/// Run one automation command
pub async fn run_command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> impl IntoResponse {
    let result: CommandResult = state.dispatcher.execute_line(&req.command).await;

    let status = if result.ok {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };

    (status, Json(result))
}

/// GET /targets
/// List named click targets
pub async fn list_targets(State(state): State<AppState>) -> impl IntoResponse {
    let targets: Vec<ClickTarget> = state.dispatcher.targets().list();
    (StatusCode::OK, Json(targets))
}

/// GET /screenshot/click
/// Capture taken after the latest click, with the click marker drawn in
pub async fn last_click_screenshot(State(state): State<AppState>) -> impl IntoResponse {
    match state.dispatcher.last_click_frame() {
        Some(frame) => (StatusCode::OK, Json(ScreenshotPayload::from(&frame))).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "No click captured yet".to_string(),
            }),
        )
            .into_response(),
    }
}

/// POST /session/start
/// Start a recording session (supersedes any active one)
pub async fn start_session(State(state): State<AppState>) -> impl IntoResponse {
    match state.dispatcher.controller().start_session().await {
        Ok(session_id) => {
            info!("Recording session started via HTTP: {}", session_id);
            (
                StatusCode::OK,
                Json(StartSessionResponse {
                    session_id,
                    status: "listening".to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to start session: {:#}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: format!("Failed to start session: {:#}", e),
                }),
            )
                .into_response()
        }
    }
}

/// POST /session/stop
/// Stop the active session; a no-op when idle
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.dispatcher.controller().stop_session().await;

    let status = if report.is_some() { "stopped" } else { "idle" };

    (
        StatusCode::OK,
        Json(StopSessionResponse {
            status: status.to_string(),
            report,
        }),
    )
}

/// GET /session/status
/// Current recording state and the last finalized report
pub async fn session_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.dispatcher.controller().status().await;
    (StatusCode::OK, Json(status))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
