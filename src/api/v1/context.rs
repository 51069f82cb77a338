//! Targeting context and data layer handlers

use axum::{extract::State, http::StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::{ApiError, DataLayerPushResponse, Json, ReferrerRequest};
use crate::domain::experimentation::SessionInfo;

/// PUT /v1/session
pub async fn update_session(
    State(state): State<AppState>,
    Json(session): Json<SessionInfo>,
) -> StatusCode {
    debug!(
        is_authenticated = session.is_authenticated,
        roles = session.roles.len(),
        "Updating session"
    );

    state.experimentation.update_session(&session);
    StatusCode::NO_CONTENT
}

/// PUT /v1/referrer
pub async fn set_referrer(
    State(state): State<AppState>,
    Json(request): Json<ReferrerRequest>,
) -> StatusCode {
    let referrer = request.to_domain();
    debug!(
        origin = %referrer.origin,
        marketing_referrer_path = %referrer.marketing_referrer_path,
        "Setting referrer"
    );

    state.experimentation.set_referrer(&referrer);
    StatusCode::NO_CONTENT
}

/// POST /v1/data-layer
pub async fn push_data_layer(
    State(state): State<AppState>,
    Json(entry): Json<Value>,
) -> Result<(StatusCode, Json<DataLayerPushResponse>), ApiError> {
    if !entry.is_object() {
        return Err(ApiError::bad_request("Data layer entries must be JSON objects"));
    }

    let length = state.data_layer.push(entry);

    Ok((StatusCode::ACCEPTED, Json(DataLayerPushResponse { length })))
}
