//! In-process store of resolved tests with per-name subscriptions
//!
//! Holds the latest [`ExperimentationTest`] per test name and the callbacks
//! interested in each name. `set` is last-write-wins and synchronously
//! notifies the subscribers registered for that name at the time of the
//! write. Nothing is persisted and nothing is evicted.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use crate::domain::experimentation::{ExperimentationTest, ExperimentationTestName};

/// Callback invoked with the new value whenever a subscribed test is set
pub type SubscriptionCallback = Arc<dyn Fn(&ExperimentationTest) + Send + Sync>;

#[derive(Default)]
struct StoreState {
    tests: HashMap<ExperimentationTestName, ExperimentationTest>,
    // BTreeMap keeps notification order equal to subscription order
    subscribers: HashMap<ExperimentationTestName, BTreeMap<u64, SubscriptionCallback>>,
}

#[derive(Default)]
struct StoreInner {
    state: RwLock<StoreState>,
    next_subscription_id: AtomicU64,
}

impl StoreInner {
    // Callbacks never run under the lock, so a poisoned lock still holds
    // consistent maps.
    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_subscriber(&self, name: &ExperimentationTestName, id: u64) -> bool {
        let mut state = self.write();

        let Some(callbacks) = state.subscribers.get_mut(name) else {
            return false;
        };

        let removed = callbacks.remove(&id).is_some();

        if callbacks.is_empty() {
            state.subscribers.remove(name);
        }

        removed
    }
}

/// Shared handle to the experimentation store
///
/// Cloning is cheap; all clones see the same entries and subscribers.
#[derive(Clone, Default)]
pub struct ExperimentationStore {
    inner: Arc<StoreInner>,
}

impl ExperimentationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached test for a name
    pub fn get(&self, name: &ExperimentationTestName) -> Option<ExperimentationTest> {
        self.inner.read().tests.get(name).cloned()
    }

    /// Store a test under its own name and notify that name's subscribers
    ///
    /// Returns the value it replaced, if any.
    pub fn set(&self, test: ExperimentationTest) -> Option<ExperimentationTest> {
        let (previous, callbacks) = {
            let mut state = self.inner.write();
            let previous = state.tests.insert(test.name().clone(), test.clone());
            let callbacks: Vec<SubscriptionCallback> = state
                .subscribers
                .get(test.name())
                .map(|callbacks| callbacks.values().cloned().collect())
                .unwrap_or_default();

            (previous, callbacks)
        };

        for callback in callbacks {
            callback(&test);
        }

        previous
    }

    /// Register a callback for future writes to `name`
    ///
    /// The callback is not invoked with the current value; read it with
    /// [`get`](Self::get). The registration lasts until the returned
    /// [`Subscription`] is unsubscribed or dropped.
    pub fn subscribe<F>(&self, name: &ExperimentationTestName, callback: F) -> Subscription
    where
        F: Fn(&ExperimentationTest) + Send + Sync + 'static,
    {
        let id = self
            .inner
            .next_subscription_id
            .fetch_add(1, Ordering::Relaxed);

        self.inner
            .write()
            .subscribers
            .entry(name.clone())
            .or_default()
            .insert(id, Arc::new(callback));

        Subscription {
            store: Arc::downgrade(&self.inner),
            name: name.clone(),
            id,
        }
    }

    /// Number of cached tests
    pub fn len(&self) -> usize {
        self.inner.read().tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().tests.is_empty()
    }

    /// Names of all cached tests
    pub fn names(&self) -> Vec<ExperimentationTestName> {
        self.inner.read().tests.keys().cloned().collect()
    }

    /// Number of live subscriptions for a name
    pub fn subscriber_count(&self, name: &ExperimentationTestName) -> usize {
        self.inner
            .read()
            .subscribers
            .get(name)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for ExperimentationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.read();
        f.debug_struct("ExperimentationStore")
            .field("tests", &state.tests.len())
            .field("subscribed_names", &state.subscribers.len())
            .finish()
    }
}

/// Handle to a registered callback; dropping it unsubscribes
#[must_use = "dropping a Subscription unsubscribes immediately"]
#[derive(Debug)]
pub struct Subscription {
    store: Weak<StoreInner>,
    name: ExperimentationTestName,
    id: u64,
}

impl Subscription {
    pub fn name(&self) -> &ExperimentationTestName {
        &self.name
    }

    /// Stop receiving updates
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            inner.remove_subscriber(&self.name, self.id);
        }
        self.store = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}
