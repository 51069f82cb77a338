//! API request and response types

pub mod error;
pub mod experimentation;
pub mod json;

pub use error::{ApiError, ApiErrorResponse};
pub use experimentation::{
    DataLayerPushResponse, ExperimentationTestResponse, LogLevelRequest, LogLevelResponse,
    ReferrerRequest,
};
pub use json::Json;
