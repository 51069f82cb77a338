//! Experimentation service: lazy, deduplicated decision lookups
//!
//! Lookups are answered from the [`ExperimentationStore`] when possible. On a
//! miss the decision source is asked once per test name, even when several
//! callers miss concurrently; the result is cached, announced to subscribers
//! and published as an impression event.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use metrics::counter;
use tracing::{debug, info, warn};

use super::store::{ExperimentationStore, Subscription, SubscriptionCallback};
use crate::domain::experimentation::{
    Assignment, DecisionSource, EventPublisher, ExperimentationImpressionEvent,
    ExperimentationPlatform, ExperimentationTest, ExperimentationTestName, ReferrerInfo,
    SessionInfo,
};
use crate::domain::DomainError;

/// Operations the API and CLI use to read experimentation decisions
#[async_trait]
pub trait ExperimentationServiceTrait: Send + Sync {
    fn platform(&self) -> ExperimentationPlatform;

    fn is_ready(&self) -> bool;

    /// Get the test for `name`, asking the provider on a cache miss
    ///
    /// Returns `Ok(None)` when the provider is not ready or has no decision.
    async fn get_experimentation_test(
        &self,
        name: &ExperimentationTestName,
    ) -> Result<Option<ExperimentationTest>, DomainError>;

    /// Ask the provider again and overwrite the cached test
    async fn refresh(
        &self,
        name: &ExperimentationTestName,
    ) -> Result<Option<ExperimentationTest>, DomainError>;

    /// Register for updates to `name`
    fn subscribe(
        &self,
        name: &ExperimentationTestName,
        callback: SubscriptionCallback,
    ) -> Subscription;

    fn update_session(&self, session: &SessionInfo);

    fn set_referrer(&self, referrer: &ReferrerInfo);

    async fn track_event(&self, event_key: &str) -> Result<(), DomainError>;
}

type LookupGate = Arc<tokio::sync::Mutex<()>>;

/// Service combining a decision source, the store and the event bus
pub struct ExperimentationService {
    source: Arc<dyn DecisionSource>,
    store: ExperimentationStore,
    events: Arc<dyn EventPublisher>,
    // One gate per name with a lookup in flight
    gates: Mutex<HashMap<ExperimentationTestName, LookupGate>>,
}

impl ExperimentationService {
    pub fn new(
        source: Arc<dyn DecisionSource>,
        store: ExperimentationStore,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            source,
            store,
            events,
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &ExperimentationStore {
        &self.store
    }

    fn gate_for(&self, name: &ExperimentationTestName) -> LookupGate {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(name.clone()).or_default())
    }

    fn release_gate(&self, name: &ExperimentationTestName, gate: &LookupGate) {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);

        // Only the map and this caller still hold the gate: nobody is waiting.
        let idle = gates
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, gate) && Arc::strong_count(gate) == 2);

        if idle {
            gates.remove(name);
        }
    }

    async fn resolve(
        &self,
        name: &ExperimentationTestName,
        force: bool,
    ) -> Result<Option<ExperimentationTest>, DomainError> {
        let gate = self.gate_for(name);

        let result = {
            let _guard = gate.lock().await;
            self.resolve_locked(name, force).await
        };

        self.release_gate(name, &gate);
        result
    }

    async fn resolve_locked(
        &self,
        name: &ExperimentationTestName,
        force: bool,
    ) -> Result<Option<ExperimentationTest>, DomainError> {
        // A concurrent lookup may have filled the cache while we waited
        if !force {
            if let Some(cached) = self.store.get(name) {
                counter!("experimentation_cache_hits_total").increment(1);
                return Ok(Some(cached));
            }
        }

        let platform = self.source.platform();
        counter!("experimentation_decisions_total", "platform" => platform.as_str())
            .increment(1);

        let decision = match self.source.decide(name).await {
            Ok(decision) => decision,
            Err(e) => {
                counter!("experimentation_decision_errors_total", "platform" => platform.as_str())
                    .increment(1);
                warn!(test_name = %name, error = %e, "Decision lookup failed");
                return Err(e);
            }
        };

        let Some(decision) = decision else {
            debug!(test_name = %name, "Provider returned no decision");
            return Ok(None);
        };

        let test = ExperimentationTest::new(
            name.clone(),
            Assignment::from_enabled(decision.enabled),
            self.source.subject_id(),
        );

        let previous = self.store.set(test.clone());

        if previous.as_ref().map(ExperimentationTest::assignment) != Some(test.assignment()) {
            info!(
                test_name = %name,
                assignment = %test.assignment(),
                platform = %platform,
                "Experimentation assignment resolved"
            );
        }

        self.events.publish(ExperimentationImpressionEvent::new(
            test.subject_id(),
            name.clone(),
            test.assignment(),
        ));

        Ok(Some(test))
    }
}

impl std::fmt::Debug for ExperimentationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentationService")
            .field("platform", &self.source.platform())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ExperimentationServiceTrait for ExperimentationService {
    fn platform(&self) -> ExperimentationPlatform {
        self.source.platform()
    }

    fn is_ready(&self) -> bool {
        self.source.is_ready()
    }

    async fn get_experimentation_test(
        &self,
        name: &ExperimentationTestName,
    ) -> Result<Option<ExperimentationTest>, DomainError> {
        if !self.is_ready() {
            debug!(test_name = %name, "Provider not ready, no decision");
            return Ok(None);
        }

        if let Some(cached) = self.store.get(name) {
            counter!("experimentation_cache_hits_total").increment(1);
            return Ok(Some(cached));
        }

        counter!("experimentation_cache_misses_total").increment(1);
        self.resolve(name, false).await
    }

    async fn refresh(
        &self,
        name: &ExperimentationTestName,
    ) -> Result<Option<ExperimentationTest>, DomainError> {
        if !self.is_ready() {
            return Ok(None);
        }

        self.resolve(name, true).await
    }

    fn subscribe(
        &self,
        name: &ExperimentationTestName,
        callback: SubscriptionCallback,
    ) -> Subscription {
        self.store.subscribe(name, move |test| callback(test))
    }

    fn update_session(&self, session: &SessionInfo) {
        self.source.update_session(session);
    }

    fn set_referrer(&self, referrer: &ReferrerInfo) {
        self.source.set_referrer(referrer);
    }

    async fn track_event(&self, event_key: &str) -> Result<(), DomainError> {
        self.source.track_event(event_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experimentation::{
        Decision, MockDecisionSource, MockEventPublisher, SubjectId,
    };
    use crate::infrastructure::events::InMemoryEventBus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn name(value: &str) -> ExperimentationTestName {
        ExperimentationTestName::new(value).unwrap()
    }

    fn ready_source(subject: SubjectId) -> MockDecisionSource {
        let mut source = MockDecisionSource::new();
        source.expect_is_ready().return_const(true);
        source.expect_subject_id().return_const(subject);
        source
            .expect_platform()
            .return_const(ExperimentationPlatform::Sdk);
        source
    }

    fn quiet_events() -> Arc<dyn EventPublisher> {
        Arc::new(InMemoryEventBus::new(16))
    }

    fn service(source: MockDecisionSource) -> ExperimentationService {
        ExperimentationService::new(Arc::new(source), ExperimentationStore::new(), quiet_events())
    }

    #[tokio::test]
    async fn test_not_ready_returns_none_without_lookup() {
        let mut source = MockDecisionSource::new();
        source.expect_is_ready().return_const(false);
        source.expect_decide().never();

        let service = service(source);
        let result = service.get_experimentation_test(&name("banner")).await.unwrap();

        assert!(result.is_none());
        assert!(service.store().is_empty());
    }

    #[tokio::test]
    async fn test_miss_fetches_and_caches() {
        let subject = SubjectId::new();
        let mut source = ready_source(subject);
        source
            .expect_decide()
            .times(1)
            .returning(|name| Ok(Some(Decision::new(name.as_str(), true))));

        let service = service(source);

        let first = service
            .get_experimentation_test(&name("banner"))
            .await
            .unwrap()
            .unwrap();
        let second = service
            .get_experimentation_test(&name("banner"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.assignment(), Assignment::Treatment);
        assert_eq!(first.subject_id(), subject);
        assert_eq!(first, second);
        assert_eq!(service.store().get(&name("banner")), Some(first));
    }

    #[tokio::test]
    async fn test_no_decision_is_not_cached() {
        let mut source = ready_source(SubjectId::new());
        source.expect_decide().times(2).returning(|_| Ok(None));

        let service = service(source);

        assert!(service.get_experimentation_test(&name("banner")).await.unwrap().is_none());
        assert!(service.get_experimentation_test(&name("banner")).await.unwrap().is_none());
        assert!(service.store().is_empty());
    }

    #[tokio::test]
    async fn test_provider_error_is_returned_and_not_cached() {
        let mut source = ready_source(SubjectId::new());
        source
            .expect_decide()
            .times(1)
            .returning(|_| Err(DomainError::provider("sdk", "HTTP 500")));

        let service = service(source);
        let error = service
            .get_experimentation_test(&name("banner"))
            .await
            .unwrap_err();

        assert!(matches!(error, DomainError::Provider { .. }));
        assert!(service.store().is_empty());
    }

    #[tokio::test]
    async fn test_fresh_decision_notifies_subscribers() {
        let mut source = ready_source(SubjectId::new());
        source
            .expect_decide()
            .returning(|name| Ok(Some(Decision::new(name.as_str(), false))));

        let service = service(source);
        let notified = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notified);
        let _subscription = service.subscribe(
            &name("banner"),
            Arc::new(move |test: &ExperimentationTest| sink.lock().unwrap().push(test.clone())),
        );

        let test = service
            .get_experimentation_test(&name("banner"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(*notified.lock().unwrap(), vec![test]);
    }

    #[tokio::test]
    async fn test_fresh_decision_publishes_impression() {
        let subject = SubjectId::new();
        let mut source = ready_source(subject);
        source
            .expect_decide()
            .times(1)
            .returning(|name| Ok(Some(Decision::new(name.as_str(), true))));

        let mut events = MockEventPublisher::new();
        events
            .expect_publish()
            .withf(move |event| {
                event.device_id == subject
                    && event.experimentation_name.as_str() == "banner"
                    && event.assignment == Assignment::Treatment
            })
            .times(1)
            .return_const(());

        let service =
            ExperimentationService::new(Arc::new(source), ExperimentationStore::new(), Arc::new(events));

        service.get_experimentation_test(&name("banner")).await.unwrap();
        // Cached lookups do not publish again
        service.get_experimentation_test(&name("banner")).await.unwrap();
    }

    /// Source whose decisions block until the test releases them
    struct HeldSource {
        calls: AtomicUsize,
        release: tokio::sync::Semaphore,
        subject: SubjectId,
    }

    #[async_trait]
    impl DecisionSource for HeldSource {
        fn platform(&self) -> ExperimentationPlatform {
            ExperimentationPlatform::InHouse
        }

        fn is_ready(&self) -> bool {
            true
        }

        fn subject_id(&self) -> SubjectId {
            self.subject
        }

        async fn decide(
            &self,
            name: &ExperimentationTestName,
        ) -> Result<Option<Decision>, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self
                .release
                .acquire()
                .await
                .map_err(|e| DomainError::internal(e.to_string()))?;
            Ok(Some(Decision::new(name.as_str(), true)))
        }
    }

    fn waiting_callers(service: &ExperimentationService, name: &ExperimentationTestName) -> usize {
        service
            .gates
            .lock()
            .unwrap()
            .get(name)
            .map_or(0, |gate| Arc::strong_count(gate) - 1)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_share_one_lookup() {
        const CALLERS: usize = 8;

        let source = Arc::new(HeldSource {
            calls: AtomicUsize::new(0),
            release: tokio::sync::Semaphore::new(0),
            subject: SubjectId::new(),
        });
        let service = Arc::new(ExperimentationService::new(
            Arc::clone(&source) as Arc<dyn DecisionSource>,
            ExperimentationStore::new(),
            quiet_events(),
        ));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .get_experimentation_test(&name("banner"))
                        .await
                        .unwrap()
                })
            })
            .collect();

        // Every caller holds the gate for "banner" while the first decision is pending
        tokio::time::timeout(Duration::from_secs(5), async {
            while waiting_callers(&service, &name("banner")) < CALLERS
                || source.calls.load(Ordering::SeqCst) == 0
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        source.release.add_permits(CALLERS);

        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(service.gates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_overwrites_and_notifies() {
        let enabled = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&enabled);

        let mut source = ready_source(SubjectId::new());
        source.expect_decide().returning(move |name| {
            Ok(Some(Decision::new(name.as_str(), flag.load(Ordering::SeqCst))))
        });

        let service = service(source);
        let notified = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notified);
        let _subscription = service.subscribe(
            &name("banner"),
            Arc::new(move |test: &ExperimentationTest| sink.lock().unwrap().push(test.assignment())),
        );

        let first = service
            .get_experimentation_test(&name("banner"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.assignment(), Assignment::Control);

        enabled.store(true, Ordering::SeqCst);
        let refreshed = service.refresh(&name("banner")).await.unwrap().unwrap();

        assert_eq!(refreshed.assignment(), Assignment::Treatment);
        assert_eq!(
            service.store().get(&name("banner")).map(|t| t.assignment()),
            Some(Assignment::Treatment)
        );
        assert_eq!(
            *notified.lock().unwrap(),
            vec![Assignment::Control, Assignment::Treatment]
        );
    }

    #[tokio::test]
    async fn test_delegates_context_updates() {
        let mut source = ready_source(SubjectId::new());
        source
            .expect_update_session()
            .withf(|session| session.is_authenticated)
            .times(1)
            .return_const(());
        source.expect_set_referrer().times(1).return_const(());
        source
            .expect_track_event()
            .withf(|key| key == "em_signup")
            .times(1)
            .returning(|_| Ok(()));

        let service = service(source);
        service.update_session(&SessionInfo {
            is_authenticated: true,
            roles: vec![],
        });
        service.set_referrer(&ReferrerInfo::default());
        service.track_event("em_signup").await.unwrap();
    }
}
