//! User context sent along with decision requests

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use super::entity::SubjectId;

/// Audience attribute: page the visitor came from
pub const REFERRER_ORIGIN: &str = "REFERRER_origin";
/// Audience attribute: marketing path carried in the `ph` query parameter
pub const REFERRER_MARKETING_PATH: &str = "REFERRER_marketingReferrerPath";
/// Audience attribute: whether the session is signed in
pub const SESSION_IS_AUTHENTICATED: &str = "SESSION_isAuthenticated";
/// Audience attribute: whether the session user has the broker role
pub const SESSION_IS_BROKER: &str = "SESSION_isBroker";

const MARKETING_PATH_QUERY_PARAM: &str = "ph";
const BROKER_ROLE: &str = "broker";

/// Value of a user context attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    String(String),
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// The subject plus the audience attributes decisions are targeted on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    user_id: SubjectId,
    attributes: HashMap<String, AttributeValue>,
}

impl UserContext {
    /// Create a context seeded with the default audience attributes
    pub fn new(user_id: SubjectId) -> Self {
        let attributes = HashMap::from([
            (REFERRER_ORIGIN.to_string(), AttributeValue::from("")),
            (REFERRER_MARKETING_PATH.to_string(), AttributeValue::from("")),
            (SESSION_IS_AUTHENTICATED.to_string(), AttributeValue::from(false)),
            (SESSION_IS_BROKER.to_string(), AttributeValue::from(false)),
        ]);

        Self {
            user_id,
            attributes,
        }
    }

    pub fn user_id(&self) -> SubjectId {
        self.user_id
    }

    pub fn attributes(&self) -> &HashMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Apply session state to the `SESSION_*` attributes
    pub fn apply_session(&mut self, session: &SessionInfo) {
        self.set_attribute(SESSION_IS_AUTHENTICATED, session.is_authenticated);
        self.set_attribute(SESSION_IS_BROKER, session.is_broker());
    }

    /// Apply referrer information to the `REFERRER_*` attributes
    pub fn apply_referrer(&mut self, referrer: &ReferrerInfo) {
        self.set_attribute(REFERRER_ORIGIN, referrer.origin.clone());
        self.set_attribute(
            REFERRER_MARKETING_PATH,
            referrer.marketing_referrer_path.clone(),
        );
    }
}

/// Active session as seen by the application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub is_authenticated: bool,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl SessionInfo {
    pub fn is_broker(&self) -> bool {
        self.roles.iter().any(|role| role == BROKER_ROLE)
    }
}

/// Where the visitor came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferrerInfo {
    pub origin: String,
    pub marketing_referrer_path: String,
}

impl ReferrerInfo {
    /// Build referrer info from the document referrer and the landing page URL
    ///
    /// The marketing path is the percent-decoded `ph` query parameter of the
    /// landing page; it is empty when absent or when the URL does not parse.
    pub fn from_urls(referrer: &str, page_url: &str) -> Self {
        let marketing_referrer_path = Url::parse(page_url)
            .ok()
            .and_then(|url| {
                url.query_pairs()
                    .find(|(key, _)| key == MARKETING_PATH_QUERY_PARAM)
                    .map(|(_, value)| value.into_owned())
            })
            .unwrap_or_default();

        Self {
            origin: referrer.to_string(),
            marketing_referrer_path,
        }
    }
}
