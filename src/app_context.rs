//! Session state built once from the configuration.

use std::{sync::Arc, time::Duration};

use log::info;

use crate::{
    config::Config,
    schedule::{ScheduleEntry, keep_alive_interval},
    store::ActuatorStore,
    topics::{PinMode, TopicRouter},
};

/// A pin the harness can command through its `set` topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actuator {
    pub name: String,
    pub mode: PinMode,
    /// Command topic.
    pub topic: String,
    /// Keep-alive re-send interval.
    pub interval: Duration,
}

/// Shared session state.
///
/// Everything except the store is immutable after construction. The store is
/// the only value written by more than one activity.
pub struct AppState {
    /// Last-known actuator values
    pub store: Arc<ActuatorStore>,
    /// Actuators in topology order; the operator index is the position here
    pub actuators: Vec<Actuator>,
    /// Topics to subscribe to once connected
    pub subscriptions: Vec<String>,
}

impl AppState {
    /// Derives topics and schedules from the pin topology and seeds the store
    /// with every actuator's default value.
    pub fn new(config: &Config) -> Self {
        let router = TopicRouter::new(config.broker.client_id.as_str());

        let actuators: Vec<Actuator> = config
            .pins
            .iter()
            .filter_map(|pin| {
                router.set_topic(&pin.mode, &pin.name).map(|topic| Actuator {
                    name: pin.name.clone(),
                    mode: pin.mode.clone(),
                    topic,
                    interval: keep_alive_interval(pin.polling_interval),
                })
            })
            .collect();

        let subscriptions: Vec<String> = config
            .pins
            .iter()
            .filter_map(|pin| router.subscribe_topic(&pin.mode, &pin.name))
            .collect();

        let store = ActuatorStore::seeded(config.pins.iter().filter_map(|pin| {
            router
                .set_topic(&pin.mode, &pin.name)
                .map(|topic| (topic, pin.default_value()))
        }));

        info!(
            "Session state ready: {} actuators ({} seeded values), {} subscriptions",
            actuators.len(),
            store.len(),
            subscriptions.len()
        );

        Self {
            store: Arc::new(store),
            actuators,
            subscriptions,
        }
    }

    /// Fresh keep-alive schedule, one entry per actuator.
    pub fn schedule(&self) -> Vec<ScheduleEntry> {
        self.actuators
            .iter()
            .map(|act| ScheduleEntry::new(act.topic.clone(), act.interval))
            .collect()
    }

    pub fn actuator(&self, index: usize) -> Option<&Actuator> {
        self.actuators.get(index)
    }
}
