//! In-memory event bus for experimentation events

use metrics::counter;
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::experimentation::{EventPublisher, ExperimentationImpressionEvent};

/// Broadcast-backed [`EventPublisher`]
///
/// Every subscriber receives every event published after it subscribed.
/// Slow subscribers lose the oldest events once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    sender: broadcast::Sender<ExperimentationImpressionEvent>,
}

impl InMemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExperimentationImpressionEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventPublisher for InMemoryEventBus {
    fn publish(&self, event: ExperimentationImpressionEvent) {
        debug!(
            event_id = %event.id,
            event_name = %event.name,
            experimentation_name = %event.experimentation_name,
            assignment = %event.assignment,
            device_id = %event.device_id,
            "Publishing experimentation event"
        );
        counter!("experimentation_impressions_total").increment(1);

        // No receivers is not an error: nobody is listening yet
        let _ = self.sender.send(event);
    }
}
