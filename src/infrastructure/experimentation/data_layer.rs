//! Tag-manager style data layer and the forwarder that tracks its events
//!
//! The UI pushes JSON entries onto the [`DataLayer`]. The
//! [`DataLayerForwarder`] polls it, reports entries whose `event` name
//! carries the conversion prefix to the decision provider, and discards what
//! it has processed.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use metrics::counter;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::service::ExperimentationServiceTrait;

/// Default prefix marking data layer events as conversions
pub const DEFAULT_EVENT_PREFIX: &str = "em$";

/// Default number of entries the data layer retains
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Default)]
struct Entries {
    // Offset of the first retained entry
    first: usize,
    items: VecDeque<Value>,
}

impl Entries {
    fn end(&self) -> usize {
        self.first + self.items.len()
    }
}

/// Bounded list of data layer entries
///
/// Entries are addressed by absolute offsets that keep counting when old
/// entries are evicted or discarded. Pushing past `max_entries` evicts the
/// oldest entry.
#[derive(Debug)]
pub struct DataLayer {
    entries: RwLock<Entries>,
    max_entries: usize,
}

impl Default for DataLayer {
    fn default() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }
}

impl DataLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retain at most `max_entries` entries (at least one)
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Append an entry, returning the number of entries pushed so far
    pub fn push(&self, entry: Value) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.items.push_back(entry);

        while entries.items.len() > self.max_entries {
            entries.items.pop_front();
            entries.first += 1;
            counter!("experimentation_data_layer_evicted_total").increment(1);
        }

        entries.end()
    }

    /// Number of entries pushed so far, including evicted ones
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .end()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries currently held
    pub fn retained(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .len()
    }

    /// Retained entries at `offset` and after, with the offset of the first one
    ///
    /// The returned offset is past `offset` when the entries in between were
    /// already evicted.
    pub fn entries_from(&self, offset: usize) -> (usize, Vec<Value>) {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let start = offset.max(entries.first);

        let items = entries
            .items
            .iter()
            .skip(start - entries.first)
            .cloned()
            .collect();

        (start, items)
    }

    /// Drop retained entries before `offset`
    pub fn discard_before(&self, offset: usize) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let target = offset.min(entries.end());

        while entries.first < target {
            entries.items.pop_front();
            entries.first += 1;
        }
    }
}

/// Replace characters the provider rejects in event keys
pub fn sanitize_event_name(name: &str) -> String {
    name.replace('$', "_")
}

/// Polls the data layer and tracks prefixed events with the provider
pub struct DataLayerForwarder {
    data_layer: Arc<DataLayer>,
    service: Arc<dyn ExperimentationServiceTrait>,
    event_prefix: String,
    poll_interval: Duration,
    cursor: usize,
}

impl DataLayerForwarder {
    pub fn new(
        data_layer: Arc<DataLayer>,
        service: Arc<dyn ExperimentationServiceTrait>,
        event_prefix: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            data_layer,
            service,
            event_prefix: event_prefix.into(),
            poll_interval,
            cursor: 0,
        }
    }

    fn event_key(&self, entry: &Value) -> Option<String> {
        let name = entry.get("event")?.as_str()?;

        if !name.starts_with(&self.event_prefix) {
            return None;
        }

        let key = sanitize_event_name(name);
        (!key.is_empty()).then_some(key)
    }

    /// Process entries appended since the last poll; returns how many were tracked
    ///
    /// Processed entries are discarded from the data layer.
    pub async fn poll_once(&mut self) -> usize {
        let (start, entries) = self.data_layer.entries_from(self.cursor);

        if start > self.cursor {
            warn!(
                skipped = start - self.cursor,
                "Data layer entries evicted before they were forwarded"
            );
        }

        self.cursor = start + entries.len();
        self.data_layer.discard_before(self.cursor);

        if entries.is_empty() {
            return 0;
        }

        let mut tracked = 0;

        for key in entries.iter().filter_map(|entry| self.event_key(entry)) {
            match self.service.track_event(&key).await {
                Ok(()) => {
                    debug!(event_key = %key, "Tracked data layer event");
                    tracked += 1;
                }
                Err(e) => {
                    warn!(event_key = %key, error = %e, "Failed to track data layer event");
                }
            }
        }

        tracked
    }

    /// Poll on an interval until `shutdown` flips to `true` or its sender is dropped
    pub fn spawn(mut self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                interval_ms = self.poll_interval.as_millis() as u64,
                prefix = %self.event_prefix,
                "Data layer forwarder started"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.poll_once().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Data layer forwarder stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experimentation::MockDecisionSource;
    use crate::domain::DomainError;
    use crate::infrastructure::events::InMemoryEventBus;
    use crate::infrastructure::experimentation::{ExperimentationService, ExperimentationStore};
    use serde_json::json;
    use std::sync::Mutex;

    fn forwarder_with(
        data_layer: Arc<DataLayer>,
        source: MockDecisionSource,
    ) -> DataLayerForwarder {
        let service = ExperimentationService::new(
            Arc::new(source),
            ExperimentationStore::new(),
            Arc::new(InMemoryEventBus::default()),
        );

        DataLayerForwarder::new(
            data_layer,
            Arc::new(service),
            DEFAULT_EVENT_PREFIX,
            Duration::from_millis(10),
        )
    }

    fn recording_source() -> (MockDecisionSource, Arc<Mutex<Vec<String>>>) {
        let tracked = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&tracked);

        let mut source = MockDecisionSource::new();
        source.expect_track_event().returning(move |key| {
            sink.lock().unwrap().push(key.to_string());
            Ok(())
        });

        (source, tracked)
    }

    #[test]
    fn test_sanitize_event_name() {
        assert_eq!(sanitize_event_name("em$quote$started"), "em_quote_started");
        assert_eq!(sanitize_event_name("plain"), "plain");
    }

    #[test]
    fn test_data_layer_entries_from() {
        let layer = DataLayer::new();
        layer.push(json!({"event": "a"}));
        layer.push(json!({"event": "b"}));

        assert_eq!(layer.len(), 2);
        assert_eq!(layer.entries_from(1), (1, vec![json!({"event": "b"})]));
        assert_eq!(layer.entries_from(5), (5, vec![]));
    }

    #[test]
    fn test_push_past_cap_evicts_oldest() {
        let layer = DataLayer::with_max_entries(3);

        for i in 0..5 {
            assert_eq!(layer.push(json!({"event": format!("e{}", i)})), i + 1);
        }

        assert_eq!(layer.len(), 5);
        assert_eq!(layer.retained(), 3);
        assert_eq!(
            layer.entries_from(0),
            (
                2,
                vec![
                    json!({"event": "e2"}),
                    json!({"event": "e3"}),
                    json!({"event": "e4"})
                ]
            )
        );
    }

    #[test]
    fn test_discard_before() {
        let layer = DataLayer::new();
        layer.push(json!({"event": "a"}));
        layer.push(json!({"event": "b"}));

        layer.discard_before(1);
        assert_eq!(layer.retained(), 1);
        assert_eq!(layer.entries_from(0), (1, vec![json!({"event": "b"})]));

        layer.discard_before(10);
        assert_eq!(layer.retained(), 0);
        assert_eq!(layer.len(), 2);

        // Offsets keep counting after a discard
        assert_eq!(layer.push(json!({"event": "c"})), 3);
        assert_eq!(layer.entries_from(2), (2, vec![json!({"event": "c"})]));
    }

    #[test]
    fn test_zero_cap_keeps_one_entry() {
        let layer = DataLayer::with_max_entries(0);
        layer.push(json!({"event": "a"}));
        layer.push(json!({"event": "b"}));

        assert_eq!(layer.max_entries(), 1);
        assert_eq!(layer.retained(), 1);
    }

    #[tokio::test]
    async fn test_poll_tracks_only_prefixed_events() {
        let layer = Arc::new(DataLayer::new());
        let (source, tracked) = recording_source();
        let mut forwarder = forwarder_with(Arc::clone(&layer), source);

        layer.push(json!({"event": "em$signup"}));
        layer.push(json!({"event": "gtm.js"}));
        layer.push(json!({"event": 42}));
        layer.push(json!({"page": "/home"}));
        layer.push(json!({"event": "em$quote$started"}));

        assert_eq!(forwarder.poll_once().await, 2);
        assert_eq!(
            *tracked.lock().unwrap(),
            vec!["em_signup".to_string(), "em_quote_started".to_string()]
        );
    }

    #[tokio::test]
    async fn test_poll_only_processes_new_entries() {
        let layer = Arc::new(DataLayer::new());
        let (source, tracked) = recording_source();
        let mut forwarder = forwarder_with(Arc::clone(&layer), source);

        layer.push(json!({"event": "em$first"}));
        assert_eq!(forwarder.poll_once().await, 1);
        assert_eq!(forwarder.poll_once().await, 0);

        layer.push(json!({"event": "em$second"}));
        assert_eq!(forwarder.poll_once().await, 1);

        assert_eq!(
            *tracked.lock().unwrap(),
            vec!["em_first".to_string(), "em_second".to_string()]
        );
    }

    #[tokio::test]
    async fn test_poll_discards_processed_entries() {
        let layer = Arc::new(DataLayer::new());
        let (source, _tracked) = recording_source();
        let mut forwarder = forwarder_with(Arc::clone(&layer), source);

        layer.push(json!({"event": "em$signup"}));
        layer.push(json!({"page": "/home"}));
        forwarder.poll_once().await;

        assert_eq!(layer.retained(), 0);
        assert_eq!(layer.len(), 2);
    }

    #[tokio::test]
    async fn test_poll_skips_entries_evicted_before_forwarding() {
        let layer = Arc::new(DataLayer::with_max_entries(2));
        let (source, tracked) = recording_source();
        let mut forwarder = forwarder_with(Arc::clone(&layer), source);

        layer.push(json!({"event": "em$lost"}));
        layer.push(json!({"event": "em$kept1"}));
        layer.push(json!({"event": "em$kept2"}));

        assert_eq!(forwarder.poll_once().await, 2);
        assert_eq!(
            *tracked.lock().unwrap(),
            vec!["em_kept1".to_string(), "em_kept2".to_string()]
        );

        layer.push(json!({"event": "em$next"}));
        assert_eq!(forwarder.poll_once().await, 1);
        assert_eq!(tracked.lock().unwrap().last().map(String::as_str), Some("em_next"));
    }

    #[tokio::test]
    async fn test_track_failure_is_not_fatal() {
        let layer = Arc::new(DataLayer::new());
        let mut source = MockDecisionSource::new();
        source
            .expect_track_event()
            .returning(|key| {
                if key == "em_bad" {
                    Err(DomainError::provider("sdk", "HTTP 500"))
                } else {
                    Ok(())
                }
            });
        let mut forwarder = forwarder_with(Arc::clone(&layer), source);

        layer.push(json!({"event": "em$bad"}));
        layer.push(json!({"event": "em$good"}));

        assert_eq!(forwarder.poll_once().await, 1);
    }

    #[tokio::test]
    async fn test_spawned_forwarder_stops_on_shutdown() {
        let layer = Arc::new(DataLayer::new());
        let (source, tracked) = recording_source();
        let forwarder = forwarder_with(Arc::clone(&layer), source);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = forwarder.spawn(shutdown_rx);

        layer.push(json!({"event": "em$signup"}));

        for _ in 0..50 {
            if !tracked.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(*tracked.lock().unwrap(), vec!["em_signup".to_string()]);
    }
}
