use super::state::AppState;
use crate::error::RecorderError;
use crate::persistence::SaveReport;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartRecordingRequest {
    /// Id from GET /recording/sources
    pub source_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// HTTP status for a recording failure
pub fn status_for(error: &RecorderError) -> StatusCode {
    match error {
        RecorderError::SessionBusy | RecorderError::AlreadyRecording(_) => StatusCode::CONFLICT,
        RecorderError::PermissionDenied(_) | RecorderError::SourceEnumerationError(_) => {
            StatusCode::FORBIDDEN
        }
        RecorderError::SourceUnavailable(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: &RecorderError) -> Response {
    (
        status_for(error),
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /recording/sources
pub async fn list_sources(State(state): State<AppState>) -> Response {
    match state.registry.list_sources().await {
        Ok(sources) => (StatusCode::OK, Json(sources)).into_response(),
        Err(e) => {
            error!("Error getting sources: {}", e);
            error_response(&e)
        }
    }
}

/// POST /recording/start
pub async fn start_recording(
    State(state): State<AppState>,
    Json(req): Json<StartRecordingRequest>,
) -> Response {
    info!("Start requested for source: {}", req.source_id);

    let source = match state.registry.find(&req.source_id).await {
        Ok(Some(source)) => source,
        Ok(None) => return error_response(&RecorderError::SourceUnavailable(req.source_id)),
        Err(e) => return error_response(&e),
    };

    match state.coordinator.start_session(&source).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /recording/stop
///
/// Always 200: the save report, or `null` when nothing was recording.
pub async fn stop_recording(State(state): State<AppState>) -> Json<Option<SaveReport>> {
    Json(state.coordinator.stop_session().await)
}

/// GET /recording/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.coordinator.status().await)
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
