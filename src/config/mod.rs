//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, DataLayerConfig, ExperimentationConfig, InHouseConfig, InHouseRollout, LogFormat,
    LoggingConfig, MetricsConfig, SdkConfig, ServerConfig,
};
