//! Experimentation domain entities

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::validation::{validate_test_name, ExperimentationValidationError};

// ============================================================================
// ExperimentationTestName
// ============================================================================

/// Name of an experimentation test (the provider's flag key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExperimentationTestName(String);

impl ExperimentationTestName {
    /// Create a new test name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ExperimentationValidationError> {
        let name = name.into();
        validate_test_name(&name)?;
        Ok(Self(name))
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ExperimentationTestName {
    type Error = ExperimentationValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ExperimentationTestName> for String {
    fn from(name: ExperimentationTestName) -> Self {
        name.0
    }
}

impl fmt::Display for ExperimentationTestName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ExperimentationTestName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Assignment
// ============================================================================

/// Bucket a subject was assigned to for a test
///
/// Serialized as the integer `0` (control) or `1` (treatment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Assignment {
    Control,
    Treatment,
}

impl Assignment {
    /// Map a provider's `enabled` verdict to an assignment
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            Self::Treatment
        } else {
            Self::Control
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Control => 0,
            Self::Treatment => 1,
        }
    }

    pub fn is_treatment(&self) -> bool {
        matches!(self, Self::Treatment)
    }
}

impl TryFrom<u8> for Assignment {
    type Error = ExperimentationValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Control),
            1 => Ok(Self::Treatment),
            other => Err(ExperimentationValidationError::InvalidAssignment(other)),
        }
    }
}

impl From<Assignment> for u8 {
    fn from(assignment: Assignment) -> Self {
        assignment.as_u8()
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

// ============================================================================
// SubjectId
// ============================================================================

/// Identifier of the device or organization a decision is made for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(Uuid);

impl SubjectId {
    /// Generate a fresh random subject ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Parse a subject ID from its hyphenated string form
    pub fn parse(value: &str) -> Result<Self, ExperimentationValidationError> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|e| ExperimentationValidationError::InvalidSubjectId(e.to_string()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ExperimentationTest
// ============================================================================

/// A resolved experimentation test: which bucket a subject landed in
///
/// Values are immutable once created; a changed assignment is a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentationTest {
    name: ExperimentationTestName,
    assignment: Assignment,
    subject_id: SubjectId,
}

impl ExperimentationTest {
    /// Create a test from raw parts, validating the name
    pub fn create(
        name: impl Into<String>,
        assignment: Assignment,
        subject_id: SubjectId,
    ) -> Result<Self, ExperimentationValidationError> {
        Ok(Self::new(
            ExperimentationTestName::new(name)?,
            assignment,
            subject_id,
        ))
    }

    pub fn new(
        name: ExperimentationTestName,
        assignment: Assignment,
        subject_id: SubjectId,
    ) -> Self {
        Self {
            name,
            assignment,
            subject_id,
        }
    }

    pub fn name(&self) -> &ExperimentationTestName {
        &self.name
    }

    pub fn assignment(&self) -> Assignment {
        self.assignment
    }

    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    /// Whether the subject is in the treatment bucket
    pub fn is_enabled(&self) -> bool {
        self.assignment.is_treatment()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod test_name_tests {
        use super::*;

        #[test]
        fn test_valid_name() {
            let name = ExperimentationTestName::new("new-checkout").unwrap();
            assert_eq!(name.as_str(), "new-checkout");
            assert_eq!(name.to_string(), "new-checkout");
        }

        #[test]
        fn test_invalid_name() {
            assert!(ExperimentationTestName::new("").is_err());
            assert!(ExperimentationTestName::new("has space").is_err());
        }

        #[test]
        fn test_deserialize_validates() {
            let ok: Result<ExperimentationTestName, _> = serde_json::from_str("\"banner_v2\"");
            assert!(ok.is_ok());

            let bad: Result<ExperimentationTestName, _> = serde_json::from_str("\"bad name\"");
            assert!(bad.is_err());
        }
    }

    mod assignment_tests {
        use super::*;

        #[test]
        fn test_from_enabled() {
            assert_eq!(Assignment::from_enabled(true), Assignment::Treatment);
            assert_eq!(Assignment::from_enabled(false), Assignment::Control);
        }

        #[test]
        fn test_try_from_u8() {
            assert_eq!(Assignment::try_from(0).unwrap(), Assignment::Control);
            assert_eq!(Assignment::try_from(1).unwrap(), Assignment::Treatment);
            assert_eq!(
                Assignment::try_from(2),
                Err(ExperimentationValidationError::InvalidAssignment(2))
            );
        }

        #[test]
        fn test_serializes_as_integer() {
            assert_eq!(serde_json::to_string(&Assignment::Treatment).unwrap(), "1");
            assert_eq!(serde_json::to_string(&Assignment::Control).unwrap(), "0");
            assert!(serde_json::from_str::<Assignment>("3").is_err());
        }
    }

    mod subject_id_tests {
        use super::*;

        #[test]
        fn test_parse() {
            let id = SubjectId::new();
            let parsed = SubjectId::parse(&id.to_string()).unwrap();
            assert_eq!(parsed, id);
        }

        #[test]
        fn test_parse_trims_whitespace() {
            let id = SubjectId::new();
            let parsed = SubjectId::parse(&format!("{}\n", id)).unwrap();
            assert_eq!(parsed, id);
        }

        #[test]
        fn test_parse_invalid() {
            assert!(matches!(
                SubjectId::parse("not-a-uuid"),
                Err(ExperimentationValidationError::InvalidSubjectId(_))
            ));
        }
    }

    mod experimentation_test_tests {
        use super::*;

        #[test]
        fn test_create() {
            let subject = SubjectId::new();
            let test =
                ExperimentationTest::create("new-checkout", Assignment::Treatment, subject)
                    .unwrap();

            assert_eq!(test.name().as_str(), "new-checkout");
            assert_eq!(test.assignment(), Assignment::Treatment);
            assert_eq!(test.subject_id(), subject);
            assert!(test.is_enabled());
        }

        #[test]
        fn test_create_rejects_invalid_name() {
            let result =
                ExperimentationTest::create("bad name", Assignment::Control, SubjectId::new());
            assert!(result.is_err());
        }

        #[test]
        fn test_serialization_shape() {
            let subject = SubjectId::new();
            let test =
                ExperimentationTest::create("banner", Assignment::Control, subject).unwrap();
            let json = serde_json::to_value(&test).unwrap();

            assert_eq!(json["name"], "banner");
            assert_eq!(json["assignment"], 0);
            assert_eq!(json["subject_id"], subject.to_string());
        }
    }
}
