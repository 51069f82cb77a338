//! Experimentation domain module
//!
//! Types and traits for A/B test assignments: the resolved test value, the
//! targeting context sent to providers, impression events, and the decision
//! source abstraction the service is built on.

mod context;
mod entity;
mod event;
mod source;
mod validation;

pub use context::{
    AttributeValue, ReferrerInfo, SessionInfo, UserContext, REFERRER_MARKETING_PATH,
    REFERRER_ORIGIN, SESSION_IS_AUTHENTICATED, SESSION_IS_BROKER,
};
pub use entity::{Assignment, ExperimentationTest, ExperimentationTestName, SubjectId};
pub use event::{
    EventPublisher, ExperimentationEventName, ExperimentationImpressionEvent,
    EXPERIMENTATION_EVENT_ORIGIN,
};
pub use source::{Decision, DecisionSource, ExperimentationPlatform};
pub use validation::{
    validate_rollout_percentage, validate_test_name, ExperimentationValidationError,
    MAX_TEST_NAME_LENGTH,
};

#[cfg(test)]
pub use event::MockEventPublisher;
#[cfg(test)]
pub use source::MockDecisionSource;
