//! Job lifecycle event publishing.

use std::fmt::Debug;

use tokio::sync::broadcast;
use tracing::trace;

use suncube_entity::JobEvent;

/// Sink for job lifecycle events. Publishing is best-effort and never fails
/// the operation that produced the event.
pub trait EventPublisher: Send + Sync + Debug + 'static {
    /// Publish an event to current subscribers.
    fn publish(&self, event: JobEvent);
}

/// In-process event bus built on a tokio broadcast channel.
///
/// Slow subscribers lose the oldest events rather than blocking workers.
#[derive(Debug, Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl BroadcastEventBus {
    /// Create a bus that buffers up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventPublisher for BroadcastEventBus {
    fn publish(&self, event: JobEvent) {
        // An error only means there are no subscribers.
        if self.sender.send(event).is_err() {
            trace!("No job event subscribers");
        }
    }
}
