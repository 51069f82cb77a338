//! Request and response bodies for the experimentation endpoints

use serde::{Deserialize, Serialize};

use crate::domain::experimentation::{ExperimentationTest, ReferrerInfo, SubjectId};

/// A resolved A/B test as returned by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentationTestResponse {
    pub name: String,
    /// `0` for control, `1` for treatment
    pub assignment: u8,
    pub enabled: bool,
    pub subject_id: SubjectId,
}

impl ExperimentationTestResponse {
    pub fn from_domain(test: &ExperimentationTest) -> Self {
        Self {
            name: test.name().to_string(),
            assignment: test.assignment().as_u8(),
            enabled: test.is_enabled(),
            subject_id: test.subject_id(),
        }
    }
}

/// Body of `PUT /v1/referrer`
#[derive(Debug, Clone, Deserialize)]
pub struct ReferrerRequest {
    #[serde(default)]
    pub referrer: String,
    #[serde(default)]
    pub page_url: String,
}

impl ReferrerRequest {
    pub fn to_domain(&self) -> ReferrerInfo {
        ReferrerInfo::from_urls(&self.referrer, &self.page_url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataLayerPushResponse {
    pub length: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogLevelRequest {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLevelResponse {
    pub level: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experimentation::{Assignment, ExperimentationTestName};

    #[test]
    fn test_response_from_domain() {
        let subject_id = SubjectId::new();
        let test = ExperimentationTest::new(
            ExperimentationTestName::new("banner").unwrap(),
            Assignment::Treatment,
            subject_id,
        );

        let response = ExperimentationTestResponse::from_domain(&test);
        assert_eq!(response.name, "banner");
        assert_eq!(response.assignment, 1);
        assert!(response.enabled);
        assert_eq!(response.subject_id, subject_id);
    }

    #[test]
    fn test_referrer_request_defaults() {
        let request: ReferrerRequest =
            serde_json::from_str(r#"{"page_url": "https://example.com/?ph=%2Fpromo"}"#).unwrap();

        assert_eq!(request.referrer, "");
        assert_eq!(request.to_domain().marketing_referrer_path, "/promo");
    }
}
