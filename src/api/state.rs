//! Application state for shared services

use std::sync::Arc;

use crate::infrastructure::experimentation::{DataLayer, ExperimentationServiceTrait};
use crate::infrastructure::logging::LogLevelHandle;

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub experimentation: Arc<dyn ExperimentationServiceTrait>,
    pub data_layer: Arc<DataLayer>,
    /// Present when the process owns the global subscriber
    pub log_level: Option<LogLevelHandle>,
}

impl AppState {
    pub fn new(
        experimentation: Arc<dyn ExperimentationServiceTrait>,
        data_layer: Arc<DataLayer>,
    ) -> Self {
        Self {
            experimentation,
            data_layer,
            log_level: None,
        }
    }

    pub fn with_log_level(mut self, handle: LogLevelHandle) -> Self {
        self.log_level = Some(handle);
        self
    }
}
