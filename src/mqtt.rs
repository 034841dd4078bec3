//! `rumqttc` adapters for [`Broker`] and [`ConnectionDriver`].

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS,
};

use crate::{
    broker::{Broker, ClientEvent, ConnectionDriver},
    config::BrokerConfig,
};

/// Capacity of the request channel between [`MqttBroker`] and the event loop.
const REQUEST_CAPACITY: usize = 64;

/// Suffix appended to the device client id so the harness never kicks the
/// device itself off the broker.
const CLIENT_ID_SUFFIX: &str = "_test";

/// Builds the client pair for `config`. Nothing touches the network until the
/// driver is polled.
pub fn connect(config: &BrokerConfig) -> (MqttBroker, MqttDriver) {
    info!(
        "MQTT client prepared for {}:{} (client id {}{CLIENT_ID_SUFFIX})",
        config.host, config.port, config.client_id
    );

    let (client, eventloop) = AsyncClient::new(options(config), REQUEST_CAPACITY);
    (MqttBroker { client }, MqttDriver { eventloop })
}

fn options(config: &BrokerConfig) -> MqttOptions {
    let mut options = MqttOptions::new(
        format!("{}{CLIENT_ID_SUFFIX}", config.client_id),
        config.host.clone(),
        config.port,
    );
    options.set_keep_alive(Duration::from_secs(config.keep_alive_seconds));

    if let Some(username) = config.username.as_deref().filter(|u| !u.is_empty()) {
        options.set_credentials(username, config.password.clone().unwrap_or_default());
    }
    options
}

/// Outbound side backed by [`AsyncClient`].
#[derive(Clone)]
pub struct MqttBroker {
    client: AsyncClient,
}

#[async_trait]
impl Broker for MqttBroker {
    fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .with_context(|| format!("Failed to queue publish on {topic}"))
    }

    fn subscribe(&self, topic: &str) -> Result<()> {
        self.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .with_context(|| format!("Failed to queue subscription to {topic}"))
    }

    async fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .context("Failed to send MQTT disconnect")
    }
}

/// Inbound side backed by [`EventLoop`].
pub struct MqttDriver {
    eventloop: EventLoop,
}

#[async_trait]
impl ConnectionDriver for MqttDriver {
    async fn next_event(&mut self) -> Result<ClientEvent> {
        loop {
            let event = match self.eventloop.poll().await {
                Ok(event) => event,
                Err(ConnectionError::ConnectionRefused(code)) => {
                    return Ok(ClientEvent::ConnectionRefused(format!("{code:?}")));
                }
                Err(e) => return Err(e).context("MQTT connection failed"),
            };

            if let Some(event) = client_event(event) {
                return Ok(event);
            }
        }
    }
}

/// Maps a raw event loop notification to what the session cares about.
/// Pings, acks and other bookkeeping yield `None`.
fn client_event(event: Event) -> Option<ClientEvent> {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) if ack.code == ConnectReturnCode::Success => {
            Some(ClientEvent::Connected)
        }
        Event::Incoming(Packet::ConnAck(ack)) => {
            Some(ClientEvent::ConnectionRefused(format!("{:?}", ack.code)))
        }
        Event::Incoming(Packet::Publish(publish)) => Some(ClientEvent::Message {
            topic: publish.topic,
            payload: String::from_utf8_lossy(&publish.payload).into_owned(),
        }),
        Event::Outgoing(Outgoing::Disconnect) => Some(ClientEvent::Disconnected),
        other => {
            debug!("MQTT event: {other:?}");
            None
        }
    }
}
