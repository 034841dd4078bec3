use anyhow::{Result, anyhow};
use log::{debug, info};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::{
    broker::{Broker, ClientEvent, ConnectionDriver},
    event::{Event, EventBus},
    providers::traits::ServiceProvider,
    subscriptions::SubscriptionController,
    task_manager::TaskManager,
};

/// Task name of the connection driver.
pub const NETWORK_SERVICE: &str = "NetworkService";

/// Drives the MQTT connection and dispatches its events.
///
/// Connection lifecycle changes go out on the [`EventBus`]; subscriptions and
/// inbound messages are handled by the [`SubscriptionController`]. The driver
/// can only be started once.
pub struct NetworkServiceProvider {
    driver: Mutex<Option<Box<dyn ConnectionDriver>>>,
    broker: Arc<dyn Broker>,
    controller: Arc<SubscriptionController>,
    event_bus: EventBus,
}

impl NetworkServiceProvider {
    pub fn new(
        driver: Box<dyn ConnectionDriver>,
        broker: Arc<dyn Broker>,
        controller: Arc<SubscriptionController>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            driver: Mutex::new(Some(driver)),
            broker,
            controller,
            event_bus,
        }
    }
}

impl ServiceProvider for NetworkServiceProvider {
    fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let driver = self
            .driver
            .lock()
            .map_err(|_| anyhow!("Network driver lock poisoned"))?
            .take()
            .ok_or_else(|| anyhow!("Network service already started"))?;
        let broker = self.broker.clone();
        let controller = self.controller.clone();
        let event_bus = self.event_bus.clone();

        task_manager.spawn_task(self.name().to_string(), move |cancel_token| async move {
            run_network_service(driver, broker, controller, event_bus, cancel_token).await
        })
    }

    fn name(&self) -> &'static str {
        NETWORK_SERVICE
    }
}

async fn run_network_service(
    mut driver: Box<dyn ConnectionDriver>,
    broker: Arc<dyn Broker>,
    controller: Arc<SubscriptionController>,
    event_bus: EventBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    let mut connected = false;

    loop {
        let event = tokio::select! {
            biased;
            () = cancel_token.cancelled() => {
                info!("Network service cancelled");
                return Ok(());
            }
            event = driver.next_event() => event,
        };

        match event {
            Ok(ClientEvent::Connected) => {
                connected = true;
                controller.on_connect(broker.as_ref());
                notify(&event_bus, Event::Connected);
            }
            Ok(ClientEvent::ConnectionRefused(code)) => {
                controller.on_connect_failed(&code);
                notify(&event_bus, Event::ConnectionFailed(code.clone()));
                return Err(anyhow!("Broker refused connection: {code}"));
            }
            Ok(ClientEvent::Message { topic, payload }) => {
                controller.on_message(&topic, &payload);
            }
            Ok(ClientEvent::Disconnected) => {
                info!("Disconnected from broker");
                notify(&event_bus, Event::Disconnected);
                return Ok(());
            }
            Err(e) => {
                let reason = format!("{e:#}");
                let event = if connected {
                    Event::ConnectionLost(reason)
                } else {
                    Event::ConnectionFailed(reason)
                };
                notify(&event_bus, event);
                return Err(e);
            }
        }
    }
}

fn notify(event_bus: &EventBus, event: Event) {
    if let Err(e) = event_bus.publish(event) {
        debug!("No listeners for network event: {e}");
    }
}
