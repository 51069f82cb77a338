//! Experimentation validation utilities

use thiserror::Error;

/// Maximum length for experimentation test names
pub const MAX_TEST_NAME_LENGTH: usize = 100;

/// Validation errors for experimentation values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExperimentationValidationError {
    #[error("Experimentation test name cannot be empty")]
    EmptyName,

    #[error("Experimentation test name exceeds maximum length of {0} characters")]
    NameTooLong(usize),

    #[error("Experimentation test name must start with a letter or number")]
    InvalidNameStart,

    #[error("Experimentation test name contains invalid character: '{0}'")]
    InvalidNameCharacter(char),

    #[error("Assignment must be 0 or 1, got {0}")]
    InvalidAssignment(u8),

    #[error("Invalid subject ID: {0}")]
    InvalidSubjectId(String),

    #[error("Rollout percentage must be between 0 and 100, got {0}")]
    InvalidRolloutPercentage(u8),
}

/// Validate an experimentation test name
///
/// Names are flag keys as registered with the decision provider: ASCII
/// letters, digits, `-`, `_` and `.`, starting with a letter or digit.
pub fn validate_test_name(name: &str) -> Result<(), ExperimentationValidationError> {
    let Some(first_char) = name.chars().next() else {
        return Err(ExperimentationValidationError::EmptyName);
    };

    if name.len() > MAX_TEST_NAME_LENGTH {
        return Err(ExperimentationValidationError::NameTooLong(
            MAX_TEST_NAME_LENGTH,
        ));
    }

    if !first_char.is_ascii_alphanumeric() {
        return Err(ExperimentationValidationError::InvalidNameStart);
    }

    if let Some(ch) = name
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.')))
    {
        return Err(ExperimentationValidationError::InvalidNameCharacter(ch));
    }

    Ok(())
}

/// Validate a rollout percentage (0-100 inclusive)
pub fn validate_rollout_percentage(percent: u8) -> Result<(), ExperimentationValidationError> {
    if percent > 100 {
        return Err(ExperimentationValidationError::InvalidRolloutPercentage(
            percent,
        ));
    }

    Ok(())
}
