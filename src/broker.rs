//! Seams between the harness core and the MQTT client.
//!
//! The core only ever sees [`Broker`] for outbound traffic and
//! [`ConnectionDriver`] for inbound events, so every component can be driven
//! by an in-memory double in tests.

use anyhow::Result;
use async_trait::async_trait;

/// Outbound half of the MQTT client.
///
/// `publish` and `subscribe` only hand the request to the client's own
/// machinery; they must never wait for the broker to acknowledge.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Broker: Send + Sync {
    /// Queues a QoS 0 publish.
    fn publish(&self, topic: &str, payload: &str) -> Result<()>;

    /// Queues a QoS 0 subscription.
    fn subscribe(&self, topic: &str) -> Result<()>;

    /// Sends DISCONNECT and closes the session.
    async fn disconnect(&self) -> Result<()>;
}

/// Connection-level events, replacing the client's callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The broker accepted the session.
    Connected,
    /// The broker rejected the handshake with the given return code.
    ConnectionRefused(String),
    /// An inbound publish on a subscribed topic.
    Message { topic: String, payload: String },
    /// The client sent DISCONNECT on request.
    Disconnected,
}

/// Inbound half of the MQTT client.
///
/// Each call drives the client until the next event relevant to the harness.
/// An `Err` means the transport failed and the session is over.
#[async_trait]
pub trait ConnectionDriver: Send {
    async fn next_event(&mut self) -> Result<ClientEvent>;
}
