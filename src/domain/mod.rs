//! Domain layer - Core experimentation types and traits

pub mod error;
pub mod experimentation;

pub use error::DomainError;
pub use experimentation::{
    Assignment, Decision, DecisionSource, EventPublisher, ExperimentationImpressionEvent,
    ExperimentationPlatform, ExperimentationTest, ExperimentationTestName, ReferrerInfo,
    SessionInfo, SubjectId, UserContext,
};
