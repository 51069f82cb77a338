//! Third-party experimentation SDK integration
//!
//! [`SdkClient`] is the boundary to the vendor: readiness, decisions and
//! conversion tracking. [`HttpSdkClient`] talks to a decision agent over
//! HTTP; [`SdkDecisionSource`] owns the user context and readiness state and
//! adapts the client to [`DecisionSource`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::domain::experimentation::{
    Decision, DecisionSource, ExperimentationPlatform, ExperimentationTestName, ReferrerInfo,
    SessionInfo, SubjectId, UserContext,
};
use crate::domain::DomainError;

const PROVIDER: &str = "sdk";
const SDK_KEY_HEADER: &str = "X-Optimizely-SDK-Key";

/// Outcome of waiting for the SDK to become ready
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ReadyResult {
    pub fn ready() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
        }
    }
}

/// Vendor SDK operations used by the service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SdkClient: Send + Sync {
    /// Wait until the SDK has its datafile, giving up after `timeout`
    async fn on_ready(&self, timeout: Duration) -> ReadyResult;

    /// Decide one flag for the user; `None` when the SDK returns no decision
    async fn decide(
        &self,
        user: &UserContext,
        flag_key: &str,
    ) -> Result<Option<Decision>, DomainError>;

    /// Record a conversion event for the user
    async fn track_event(&self, user: &UserContext, event_key: &str) -> Result<(), DomainError>;
}

// ============================================================================
// HTTP client
// ============================================================================

/// [`SdkClient`] backed by an HTTP decision agent
#[derive(Debug, Clone)]
pub struct HttpSdkClient {
    client: reqwest::Client,
    base_url: String,
    sdk_key: String,
}

impl HttpSdkClient {
    pub fn new(
        base_url: impl Into<String>,
        sdk_key: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                DomainError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            sdk_key: sdk_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn user_body(user: &UserContext) -> serde_json::Value {
        json!({
            "userId": user.user_id().to_string(),
            "userAttributes": user.attributes(),
        })
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DomainError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let error_body = response.text().await.unwrap_or_default();

        Err(DomainError::provider(
            PROVIDER,
            format!("HTTP {}: {}", status, error_body),
        ))
    }
}

#[async_trait]
impl SdkClient for HttpSdkClient {
    async fn on_ready(&self, timeout: Duration) -> ReadyResult {
        let request = self
            .client
            .get(self.url("/v1/config"))
            .header(SDK_KEY_HEADER, &self.sdk_key)
            .send();

        match tokio::time::timeout(timeout, request).await {
            Err(_) => ReadyResult::failed("timeout"),
            Ok(Err(e)) => ReadyResult::failed(format!("Request failed: {}", e)),
            Ok(Ok(response)) if response.status().is_success() => ReadyResult::ready(),
            Ok(Ok(response)) => ReadyResult::failed(format!("HTTP {}", response.status())),
        }
    }

    async fn decide(
        &self,
        user: &UserContext,
        flag_key: &str,
    ) -> Result<Option<Decision>, DomainError> {
        let response = self
            .client
            .post(self.url("/v1/decide"))
            .query(&[("keys", flag_key)])
            .header(SDK_KEY_HEADER, &self.sdk_key)
            .json(&Self::user_body(user))
            .send()
            .await
            .map_err(|e| DomainError::provider(PROVIDER, format!("Request failed: {}", e)))?;

        let decisions: Vec<Decision> = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| {
                DomainError::provider(PROVIDER, format!("Failed to parse response: {}", e))
            })?;

        Ok(decisions
            .into_iter()
            .find(|decision| decision.flag_key == flag_key))
    }

    async fn track_event(&self, user: &UserContext, event_key: &str) -> Result<(), DomainError> {
        let response = self
            .client
            .post(self.url("/v1/track"))
            .query(&[("eventKey", event_key)])
            .header(SDK_KEY_HEADER, &self.sdk_key)
            .json(&Self::user_body(user))
            .send()
            .await
            .map_err(|e| DomainError::provider(PROVIDER, format!("Request failed: {}", e)))?;

        Self::check_status(response).await?;
        Ok(())
    }
}

// ============================================================================
// Decision source
// ============================================================================

/// [`DecisionSource`] for the third-party SDK
pub struct SdkDecisionSource {
    client: Arc<dyn SdkClient>,
    ready: AtomicBool,
    user_context: RwLock<UserContext>,
}

impl SdkDecisionSource {
    /// Create a source for the given device; not ready until [`start`](Self::start)
    pub fn new(client: Arc<dyn SdkClient>, device_id: SubjectId) -> Self {
        Self {
            client,
            ready: AtomicBool::new(false),
            user_context: RwLock::new(UserContext::new(device_id)),
        }
    }

    /// Wait for the SDK and record whether it became ready
    pub async fn start(&self, ready_timeout: Duration) -> ReadyResult {
        let result = self.client.on_ready(ready_timeout).await;
        self.ready.store(result.success, Ordering::SeqCst);

        if result.success {
            info!("Experimentation SDK ready");
        } else {
            warn!(
                reason = result.reason.as_deref().unwrap_or("unknown"),
                "Experimentation SDK not ready"
            );
        }

        result
    }

    /// Snapshot of the current user context
    pub fn user_context(&self) -> UserContext {
        self.user_context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_context(&self, update: impl FnOnce(&mut UserContext)) {
        let mut context = self
            .user_context
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        update(&mut context);
    }
}

impl std::fmt::Debug for SdkDecisionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkDecisionSource")
            .field("ready", &self.is_ready())
            .field("subject_id", &self.subject_id())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DecisionSource for SdkDecisionSource {
    fn platform(&self) -> ExperimentationPlatform {
        ExperimentationPlatform::Sdk
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn subject_id(&self) -> SubjectId {
        self.user_context().user_id()
    }

    async fn decide(
        &self,
        name: &ExperimentationTestName,
    ) -> Result<Option<Decision>, DomainError> {
        if !self.is_ready() {
            return Err(DomainError::not_ready("Experimentation SDK is not ready"));
        }

        let user = self.user_context();
        self.client.decide(&user, name.as_str()).await
    }

    fn update_session(&self, session: &SessionInfo) {
        debug!(
            is_authenticated = session.is_authenticated,
            is_broker = session.is_broker(),
            "Updating session attributes"
        );
        self.update_context(|context| context.apply_session(session));
    }

    fn set_referrer(&self, referrer: &ReferrerInfo) {
        debug!(origin = %referrer.origin, "Updating referrer attributes");
        self.update_context(|context| context.apply_referrer(referrer));
    }

    async fn track_event(&self, event_key: &str) -> Result<(), DomainError> {
        let user = self.user_context();
        self.client.track_event(&user, event_key).await
    }
}
