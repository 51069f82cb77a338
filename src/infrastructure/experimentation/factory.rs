//! Experimentation service factory for runtime platform selection

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::device_id::DeviceIdStore;
use super::in_house::InHouseDecisionSource;
use super::sdk::{HttpSdkClient, SdkClient, SdkDecisionSource};
use super::service::ExperimentationService;
use super::store::ExperimentationStore;
use crate::config::ExperimentationConfig;
use crate::domain::experimentation::{
    DecisionSource, EventPublisher, ExperimentationPlatform, SubjectId,
};
use crate::domain::DomainError;

/// Build the service for the configured platform
///
/// For the SDK platform this waits up to `sdk.ready_timeout_ms` for the SDK.
/// A failed or timed out start is logged and the service stays not ready.
pub async fn build_experimentation_service(
    config: &ExperimentationConfig,
    events: Arc<dyn EventPublisher>,
) -> Result<Arc<ExperimentationService>, DomainError> {
    config.validate()?;

    let device_id = load_device_id(config)?;

    let source: Arc<dyn DecisionSource> = match config.platform {
        ExperimentationPlatform::Sdk => {
            let client = HttpSdkClient::new(
                &config.sdk.base_url,
                &config.sdk.sdk_key,
                Duration::from_millis(config.sdk.request_timeout_ms),
            )?;
            start_sdk_source(config, Arc::new(client), device_id).await
        }
        ExperimentationPlatform::InHouse => Arc::new(in_house_source(config, device_id)?),
    };

    Ok(finish(source, events))
}

/// Build an SDK-backed service around an existing client
pub async fn build_sdk_experimentation_service(
    config: &ExperimentationConfig,
    client: Arc<dyn SdkClient>,
    events: Arc<dyn EventPublisher>,
) -> Result<Arc<ExperimentationService>, DomainError> {
    let device_id = load_device_id(config)?;
    let source = start_sdk_source(config, client, device_id).await;

    Ok(finish(source, events))
}

fn load_device_id(config: &ExperimentationConfig) -> Result<SubjectId, DomainError> {
    match config.device_id_path.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(path) => DeviceIdStore::load_or_create(Path::new(path)),
        None => Ok(DeviceIdStore::ephemeral()),
    }
}

async fn start_sdk_source(
    config: &ExperimentationConfig,
    client: Arc<dyn SdkClient>,
    device_id: SubjectId,
) -> Arc<dyn DecisionSource> {
    let source = SdkDecisionSource::new(client, device_id);
    source
        .start(Duration::from_millis(config.sdk.ready_timeout_ms))
        .await;

    Arc::new(source)
}

fn in_house_source(
    config: &ExperimentationConfig,
    device_id: SubjectId,
) -> Result<InHouseDecisionSource, DomainError> {
    InHouseDecisionSource::new(
        device_id,
        config
            .in_house
            .tests
            .iter()
            .map(|rollout| (rollout.name.clone(), rollout.percent)),
    )
}

fn finish(
    source: Arc<dyn DecisionSource>,
    events: Arc<dyn EventPublisher>,
) -> Arc<ExperimentationService> {
    info!(
        platform = %source.platform(),
        ready = source.is_ready(),
        subject_id = %source.subject_id(),
        "Experimentation service created"
    );

    Arc::new(ExperimentationService::new(
        source,
        ExperimentationStore::new(),
        events,
    ))
}
