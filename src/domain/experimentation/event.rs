//! Impression events emitted when a decision is evaluated

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::{Assignment, ExperimentationTestName, SubjectId};

/// Origin stamped on every experimentation event
pub const EXPERIMENTATION_EVENT_ORIGIN: &str = "Experimentation";

/// Names of experimentation events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExperimentationEventName {
    /// A decision was evaluated for a subject
    Impression,
}

impl ExperimentationEventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Impression => "Impression",
        }
    }
}

impl std::fmt::Display for ExperimentationEventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Analytics event published for each fresh decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentationImpressionEvent {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub origin: String,
    pub name: ExperimentationEventName,
    pub device_id: SubjectId,
    pub experimentation_name: ExperimentationTestName,
    pub assignment: Assignment,
}

impl ExperimentationImpressionEvent {
    pub fn new(
        device_id: SubjectId,
        experimentation_name: ExperimentationTestName,
        assignment: Assignment,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            origin: EXPERIMENTATION_EVENT_ORIGIN.to_string(),
            name: ExperimentationEventName::Impression,
            device_id,
            experimentation_name,
            assignment,
        }
    }
}

/// Sink for experimentation events (the application's event bus)
///
/// Publishing is fire-and-forget: a failing sink must never fail the
/// decision lookup that produced the event.
#[cfg_attr(test, mockall::automock)]
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: ExperimentationImpressionEvent);
}
