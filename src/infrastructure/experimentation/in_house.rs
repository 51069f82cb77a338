//! In-house decision source backed by configured percentage rollouts

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use super::consistent_hashing::ConsistentHasher;
use crate::domain::experimentation::{
    validate_rollout_percentage, Decision, DecisionSource, ExperimentationPlatform,
    ExperimentationTestName, SubjectId,
};
use crate::domain::DomainError;

/// Decision source that buckets the subject locally
///
/// Every configured test enables the treatment for `percent` of subjects.
/// Tests that are not configured have no decision.
#[derive(Debug, Clone)]
pub struct InHouseDecisionSource {
    subject_id: SubjectId,
    rollouts: HashMap<ExperimentationTestName, u8>,
}

impl InHouseDecisionSource {
    /// Create a source from `test name -> rollout percent` pairs
    pub fn new(
        subject_id: SubjectId,
        rollouts: impl IntoIterator<Item = (String, u8)>,
    ) -> Result<Self, DomainError> {
        let mut validated = HashMap::new();

        for (name, percent) in rollouts {
            let test_name = ExperimentationTestName::new(&name)?;
            validate_rollout_percentage(percent)?;
            validated.insert(test_name, percent);
        }

        Ok(Self {
            subject_id,
            rollouts: validated,
        })
    }

    pub fn rollout(&self, name: &ExperimentationTestName) -> Option<u8> {
        self.rollouts.get(name).copied()
    }
}

#[async_trait]
impl DecisionSource for InHouseDecisionSource {
    fn platform(&self) -> ExperimentationPlatform {
        ExperimentationPlatform::InHouse
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    async fn decide(
        &self,
        name: &ExperimentationTestName,
    ) -> Result<Option<Decision>, DomainError> {
        let Some(percent) = self.rollout(name) else {
            debug!(test_name = %name, "No in-house rollout configured");
            return Ok(None);
        };

        let bucket = ConsistentHasher::hash_assignment(&self.subject_id, name);
        let enabled = ConsistentHasher::in_rollout(bucket, percent);

        debug!(test_name = %name, bucket, percent, enabled, "In-house decision");

        Ok(Some(Decision::new(name.as_str(), enabled)))
    }

    async fn track_event(&self, event_key: &str) -> Result<(), DomainError> {
        debug!(event_key, subject_id = %self.subject_id, "In-house event tracked");
        Ok(())
    }
}
