//! Broadcast channel for live flow events.
//!
//! Watchers (`mlorch run --watch`, tests) subscribe to every execution's
//! events; a slow watcher lags and loses the oldest events instead of
//! slowing the flow down.

use mlorch_types::event::FlowEvent;
use tokio::sync::broadcast;

use super::sink::EventSink;

/// Multi-consumer fan-out of [`FlowEvent`]s. Clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<FlowEvent>,
}

impl EventBus {
    /// `capacity` bounds how far a subscriber may fall behind before lagging.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.sender.subscribe()
    }

    /// Send to current subscribers. Dropped silently when there are none.
    pub fn publish(&self, event: FlowEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: &FlowEvent) {
        if self.subscriber_count() > 0 {
            self.publish(event.clone());
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
