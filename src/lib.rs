//! Experimentation Decisions
//!
//! Lazily fetches A/B test decisions from a provider and caches them:
//! - Third-party SDK (HTTP decision agent) or deterministic in-house rollouts
//! - Single-flight lookups per test name
//! - Subscribable cache with change notifications and impression events
//! - Data layer forwarding of conversion events

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use api::state::AppState;
use infrastructure::events::InMemoryEventBus;
use infrastructure::experimentation::{build_experimentation_service, DataLayer};

/// Create the application state with all services initialized
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let events = Arc::new(InMemoryEventBus::new(
        config.experimentation.event_bus_capacity,
    ));
    let experimentation = build_experimentation_service(&config.experimentation, events).await?;

    let data_layer = DataLayer::with_max_entries(config.experimentation.data_layer.max_entries);

    Ok(AppState::new(experimentation, Arc::new(data_layer)))
}
