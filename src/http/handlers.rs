use super::state::AppState;
use crate::error::{CaptureError, RecordingError};
use crate::session::RecordingTarget;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of `POST /recording/start`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRecordingRequest {
    #[serde(flatten)]
    pub target: RecordingTarget,
}

/// Reply to start/stop commands
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    fn ok(session_id: Option<String>) -> Self {
        Self {
            success: true,
            session_id,
            error: None,
        }
    }

    fn failed(error: &RecordingError) -> Self {
        Self {
            success: false,
            session_id: None,
            error: Some(error.to_string()),
        }
    }
}

fn error_status(error: &RecordingError) -> StatusCode {
    match error {
        RecordingError::AlreadyRecording | RecordingError::Busy(_) => StatusCode::CONFLICT,
        RecordingError::Capture(CaptureError::Connection(_)) => StatusCode::BAD_GATEWAY,
        RecordingError::Capture(CaptureError::Acquisition(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        RecordingError::Capture(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /recording/start
/// Start recording the requested source
pub async fn start_recording(
    State(state): State<AppState>,
    Json(req): Json<StartRecordingRequest>,
) -> impl IntoResponse {
    info!("Start requested for {:?}", req.target.source);

    match state.coordinator.start(req.target).await {
        Ok(session_id) => (StatusCode::OK, Json(CommandResponse::ok(Some(session_id)))),
        Err(e) => {
            match e {
                RecordingError::AlreadyRecording => warn!("Start rejected: {}", e),
                _ => error!("Failed to start recording: {}", e),
            }
            (error_status(&e), Json(CommandResponse::failed(&e)))
        }
    }
}

/// POST /recording/stop
/// Stop the current recording (succeeds when idle)
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    match state.coordinator.stop().await {
        Ok(summary) => {
            info!(
                "Recording stopped: {} chunks sent, {} dropped",
                summary.chunks_sent, summary.chunks_dropped
            );
            (StatusCode::OK, Json(CommandResponse::ok(None)))
        }
        Err(e) => {
            error!("Failed to stop recording: {}", e);
            (error_status(&e), Json(CommandResponse::failed(&e)))
        }
    }
}

/// GET /recording/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.coordinator.status().await))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
