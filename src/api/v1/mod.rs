//! v1 API endpoints

pub mod context;
pub mod debug;
pub mod experimentation;

use axum::{
    routing::{get, post, put},
    Router,
};

use super::state::AppState;

/// Create v1 API router
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route(
            "/experiments/{name}",
            get(experimentation::get_experimentation_test),
        )
        .route(
            "/experiments/{name}/refresh",
            post(experimentation::refresh_experimentation_test),
        )
        .route(
            "/experiments/{name}/stream",
            get(experimentation::stream_experimentation_test),
        )
        .route("/session", put(context::update_session))
        .route("/referrer", put(context::set_referrer))
        .route("/data-layer", post(context::push_data_layer))
        .route("/debug/log-level", put(debug::set_log_level))
}
