//! Runtime debugging controls

use axum::extract::State;

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json, LogLevelRequest, LogLevelResponse};

/// PUT /v1/debug/log-level
pub async fn set_log_level(
    State(state): State<AppState>,
    Json(request): Json<LogLevelRequest>,
) -> Result<Json<LogLevelResponse>, ApiError> {
    let handle = state
        .log_level
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("Log level control is not enabled"))?;

    handle.set_level(&request.level)?;

    Ok(Json(LogLevelResponse {
        level: handle.current().unwrap_or(request.level),
    }))
}
