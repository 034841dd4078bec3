//! In-memory doubles shared by the unit tests.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::{sync::mpsc, time::Instant};

use crate::{
    broker::{Broker, ClientEvent, ConnectionDriver},
    config::{BrokerConfig, Config, PinDeclaration, StateValue},
    display::DisplaySink,
    topics::PinMode,
};

pub fn broker_config(client_id: &str) -> BrokerConfig {
    BrokerConfig {
        host: "localhost".to_string(),
        port: 1883,
        client_id: client_id.to_string(),
        username: None,
        password: None,
        keep_alive_seconds: 60,
    }
}

/// Relay, thermocouple and fan on client `dev1`.
pub fn topology() -> Config {
    Config {
        pins: vec![
            PinDeclaration {
                name: "relay1".to_string(),
                mode: PinMode::OutputDigital,
                default_state: Some(StateValue::Integer(0)),
                polling_interval: Some(5_000),
            },
            PinDeclaration {
                name: "flue".to_string(),
                mode: PinMode::Thermocouple,
                default_state: None,
                polling_interval: Some(2_000),
            },
            PinDeclaration {
                name: "fan1".to_string(),
                mode: PinMode::Fan,
                default_state: Some(StateValue::Integer(2)),
                polling_interval: None,
            },
        ],
        broker: broker_config("dev1"),
    }
}

/// A single `OUTPUT_DIGITAL relay1` with a 5 s watchdog on client `dev1`.
pub fn single_relay() -> Config {
    Config {
        pins: vec![PinDeclaration {
            name: "relay1".to_string(),
            mode: PinMode::OutputDigital,
            default_state: Some(StateValue::Integer(0)),
            polling_interval: Some(5_000),
        }],
        broker: broker_config("dev1"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub at: Instant,
    pub topic: String,
    pub payload: String,
}

/// Broker double that records traffic and can be told to fail publishes.
///
/// `disconnect` feeds [`ClientEvent::Disconnected`] to the paired driver the
/// way the real event loop reports its outgoing DISCONNECT.
#[derive(Default)]
pub struct RecordingBroker {
    published: Mutex<Vec<Published>>,
    subscribed: Mutex<Vec<String>>,
    fail_publish: AtomicBool,
    fail_publish_to: Mutex<Option<String>>,
    fail_subscribe_to: Mutex<Option<String>>,
    disconnected: AtomicBool,
    driver_tx: Mutex<Option<mpsc::UnboundedSender<Result<ClientEvent>>>>,
}

impl RecordingBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Broker plus a driver that is fed through the returned sender.
    pub fn with_driver() -> (
        Arc<Self>,
        ScriptedDriver,
        mpsc::UnboundedSender<Result<ClientEvent>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let broker = Self::new();
        *broker.driver_tx.lock().unwrap() = Some(tx.clone());
        (broker, ScriptedDriver { rx }, tx)
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<Published> {
        self.published()
            .into_iter()
            .filter(|p| p.topic == topic)
            .collect()
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.subscribed.lock().unwrap().clone()
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Rejects publishes on `topic` only.
    pub fn fail_publish_to(&self, topic: &str) {
        *self.fail_publish_to.lock().unwrap() = Some(topic.to_string());
    }

    pub fn fail_subscribe_to(&self, topic: &str) {
        *self.fail_subscribe_to.lock().unwrap() = Some(topic.to_string());
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        if self.fail_publish.load(Ordering::SeqCst)
            || self.fail_publish_to.lock().unwrap().as_deref() == Some(topic)
        {
            return Err(anyhow!("request channel full"));
        }
        self.published.lock().unwrap().push(Published {
            at: Instant::now(),
            topic: topic.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Result<()> {
        if self.fail_subscribe_to.lock().unwrap().as_deref() == Some(topic) {
            return Err(anyhow!("subscribe rejected"));
        }
        self.subscribed.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnected.store(true, Ordering::SeqCst);
        if let Some(tx) = self.driver_tx.lock().unwrap().as_ref() {
            let _ = tx.send(Ok(ClientEvent::Disconnected));
        }
        Ok(())
    }
}

/// Driver replaying events pushed through a channel; pends once it runs dry.
pub struct ScriptedDriver {
    rx: mpsc::UnboundedReceiver<Result<ClientEvent>>,
}

#[async_trait]
impl ConnectionDriver for ScriptedDriver {
    async fn next_event(&mut self) -> Result<ClientEvent> {
        match self.rx.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }
}

/// Display double collecting everything it is asked to show.
#[derive(Default)]
pub struct RecordingDisplay {
    messages: Mutex<Vec<(String, String)>>,
    notices: Mutex<Vec<String>>,
}

impl RecordingDisplay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }

    pub fn saw_notice(&self, fragment: &str) -> bool {
        self.notices().iter().any(|n| n.contains(fragment))
    }
}

impl DisplaySink for RecordingDisplay {
    fn message(&self, topic: &str, payload: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_string()));
    }

    fn notice(&self, text: &str) {
        self.notices.lock().unwrap().push(text.to_string());
    }
}
