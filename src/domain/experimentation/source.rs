//! Decision source trait: where assignments come from

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::context::{ReferrerInfo, SessionInfo};
use super::entity::{ExperimentationTestName, SubjectId};
use crate::domain::DomainError;

/// Provider's verdict for one flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub flag_key: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation_key: Option<String>,
}

impl Decision {
    pub fn new(flag_key: impl Into<String>, enabled: bool) -> Self {
        Self {
            flag_key: flag_key.into(),
            enabled,
            variation_key: None,
        }
    }

    pub fn with_variation_key(mut self, variation_key: impl Into<String>) -> Self {
        self.variation_key = Some(variation_key.into());
        self
    }
}

/// Which decision provider backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentationPlatform {
    /// Third-party experimentation SDK
    #[default]
    Sdk,
    /// Deterministic in-house rollouts
    InHouse,
}

impl ExperimentationPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sdk => "sdk",
            Self::InHouse => "in_house",
        }
    }
}

impl fmt::Display for ExperimentationPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExperimentationPlatform {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sdk" => Ok(Self::Sdk),
            "in_house" => Ok(Self::InHouse),
            other => Err(DomainError::configuration(format!(
                "Unknown experimentation platform '{}'",
                other
            ))),
        }
    }
}

/// A provider of decisions for the current subject
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DecisionSource: Send + Sync {
    fn platform(&self) -> ExperimentationPlatform;

    /// Whether decisions can be requested yet
    fn is_ready(&self) -> bool;

    /// Subject decisions are made for
    fn subject_id(&self) -> SubjectId;

    /// Ask the provider for a decision; `None` when it has no verdict
    async fn decide(&self, name: &ExperimentationTestName)
        -> Result<Option<Decision>, DomainError>;

    /// Update session-derived targeting attributes
    fn update_session(&self, _session: &SessionInfo) {}

    /// Update referrer-derived targeting attributes
    fn set_referrer(&self, _referrer: &ReferrerInfo) {}

    /// Record a conversion event for the current subject
    async fn track_event(&self, _event_key: &str) -> Result<(), DomainError> {
        Ok(())
    }
}
