//! Experimentation infrastructure: decision sources, the cache and the service

mod consistent_hashing;
mod data_layer;
mod device_id;
mod factory;
mod in_house;
mod sdk;
mod service;
mod store;

pub use consistent_hashing::ConsistentHasher;
pub use data_layer::{
    sanitize_event_name, DataLayer, DataLayerForwarder, DEFAULT_EVENT_PREFIX, DEFAULT_MAX_ENTRIES,
};
pub use device_id::DeviceIdStore;
pub use factory::{build_experimentation_service, build_sdk_experimentation_service};
pub use in_house::InHouseDecisionSource;
pub use sdk::{HttpSdkClient, ReadyResult, SdkClient, SdkDecisionSource};
pub use service::{ExperimentationService, ExperimentationServiceTrait};
pub use store::{ExperimentationStore, Subscription, SubscriptionCallback};

#[cfg(test)]
pub use sdk::MockSdkClient;
