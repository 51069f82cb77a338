use serde::Deserialize;

use crate::domain::experimentation::{
    validate_rollout_percentage, validate_test_name, ExperimentationPlatform,
};
use crate::domain::DomainError;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub experimentation: ExperimentationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Prometheus metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

/// Experimentation provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentationConfig {
    /// Which provider backs decisions
    #[serde(default)]
    pub platform: ExperimentationPlatform,
    /// File holding the persistent device ID; a fresh ID per process when unset
    #[serde(default)]
    pub device_id_path: Option<String>,
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
    #[serde(default)]
    pub sdk: SdkConfig,
    #[serde(default)]
    pub in_house: InHouseConfig,
    #[serde(default)]
    pub data_layer: DataLayerConfig,
}

/// Third-party SDK (decision agent) settings
#[derive(Debug, Clone, Deserialize)]
pub struct SdkConfig {
    #[serde(default)]
    pub sdk_key: String,
    #[serde(default = "default_sdk_base_url")]
    pub base_url: String,
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// In-house rollouts
#[derive(Debug, Clone, Deserialize, Default)]
pub struct InHouseConfig {
    #[serde(default)]
    pub tests: Vec<InHouseRollout>,
}

/// One in-house test and the share of subjects in treatment
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct InHouseRollout {
    pub name: String,
    pub percent: u8,
}

/// Data layer forwarding settings
#[derive(Debug, Clone, Deserialize)]
pub struct DataLayerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_event_prefix")]
    pub event_prefix: String,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_event_bus_capacity() -> usize {
    1024
}

fn default_sdk_base_url() -> String {
    "http://localhost:8090".to_string()
}

fn default_ready_timeout_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_event_prefix() -> String {
    "em$".to_string()
}

fn default_max_entries() -> usize {
    10_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

impl Default for ExperimentationConfig {
    fn default() -> Self {
        Self {
            platform: ExperimentationPlatform::default(),
            device_id_path: None,
            event_bus_capacity: default_event_bus_capacity(),
            sdk: SdkConfig::default(),
            in_house: InHouseConfig::default(),
            data_layer: DataLayerConfig::default(),
        }
    }
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            sdk_key: String::new(),
            base_url: default_sdk_base_url(),
            ready_timeout_ms: default_ready_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for DataLayerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_poll_interval_ms(),
            event_prefix: default_event_prefix(),
            max_entries: default_max_entries(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Check settings that serde cannot express
    pub fn validate(&self) -> Result<(), DomainError> {
        self.experimentation.validate()
    }
}

impl ExperimentationConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.platform == ExperimentationPlatform::Sdk && self.sdk.sdk_key.trim().is_empty() {
            return Err(DomainError::configuration(
                "experimentation.sdk.sdk_key is required for the sdk platform",
            ));
        }

        for rollout in &self.in_house.tests {
            validate_test_name(&rollout.name)?;
            validate_rollout_percentage(rollout.percent)?;
        }

        if self.data_layer.enabled && self.data_layer.poll_interval_ms == 0 {
            return Err(DomainError::configuration(
                "experimentation.data_layer.poll_interval_ms must be greater than zero",
            ));
        }

        if self.data_layer.max_entries == 0 {
            return Err(DomainError::configuration(
                "experimentation.data_layer.max_entries must be greater than zero",
            ));
        }

        Ok(())
    }
}
