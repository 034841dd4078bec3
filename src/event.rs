//! Session events broadcast from the network task to the coordinator.

use anyhow::Result;
use tokio::sync::broadcast;

/// Connection lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The broker accepted the session and subscriptions were queued.
    Connected,
    /// The handshake failed; the session never started.
    ConnectionFailed(String),
    /// The transport failed after the session was established.
    ConnectionLost(String),
    /// The client disconnected on request.
    Disconnected,
}

/// Event bus for publish-subscribe messaging between tasks.
///
/// # Example
///
/// ```no_run
/// use mqtt_harness::event::{Event, EventBus};
///
/// let event_bus = EventBus::new();
/// let mut subscriber = event_bus.subscribe();
///
/// event_bus.publish(Event::Connected).unwrap();
///
/// // In async context:
/// // let event = subscriber.recv().await;
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns an error if there are no active subscribers.
    pub fn publish(&self, event: Event) -> Result<()> {
        self.sender.send(event)?;
        Ok(())
    }

    /// Each subscriber receives all events published after subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
