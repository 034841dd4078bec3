//! Handlers for connection-level client events.

use std::sync::Arc;

use log::{error, info, warn};

use crate::{broker::Broker, display::DisplaySink};

/// Subscribes to device topics on connect and forwards inbound messages.
///
/// Holds no connection of its own; whoever drives the client calls the
/// handlers, which keeps them callable from tests.
pub struct SubscriptionController {
    topics: Vec<String>,
    display: Arc<dyn DisplaySink>,
}

impl SubscriptionController {
    pub fn new(topics: Vec<String>, display: Arc<dyn DisplaySink>) -> Self {
        Self { topics, display }
    }

    /// Subscribes to every derived topic. A failed subscription is reported
    /// and skipped. Returns how many subscriptions were queued.
    pub fn on_connect(&self, broker: &dyn Broker) -> usize {
        self.display.notice("Connected to MQTT broker");

        let mut queued = 0;
        for topic in &self.topics {
            match broker.subscribe(topic) {
                Ok(()) => {
                    queued += 1;
                    self.display.notice(&format!("   Subscribed: {topic}"));
                }
                Err(e) => {
                    warn!("Subscription to {topic} failed: {e:#}");
                    self.display
                        .notice(&format!("   Subscription failed: {topic} ({e:#})"));
                }
            }
        }

        info!("Subscribed to {queued}/{} topics", self.topics.len());
        queued
    }

    /// Reports a refused handshake. No retry is attempted.
    pub fn on_connect_failed(&self, code: &str) {
        error!("Broker refused connection: {code}");
        self.display
            .notice(&format!("Connection failed with code {code}"));
    }

    /// Forwards an inbound message untouched.
    pub fn on_message(&self, topic: &str, payload: &str) {
        self.display.message(topic, payload);
    }
}
