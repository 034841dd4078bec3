//! Session coordinator: connection, services, operator loop and shutdown.

use std::{future::Future, io, sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use futures::{Stream, StreamExt};
use log::{error, info, warn};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    app_context::AppState,
    broker::{Broker, ConnectionDriver},
    display::{DisplaySink, render_menu},
    event::{Event, EventBus},
    manual_override::{ManualOverride, Outcome},
    providers::{
        AUTO_PUBLISHER, AutoPublisherServiceProvider, NETWORK_SERVICE, NetworkServiceProvider,
        ServiceProvider,
    },
    subscriptions::SubscriptionController,
    task_manager::TaskManager,
};

/// Timing knobs of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Auto-publisher scan period.
    pub tick: Duration,
    /// How long to wait for the broker to accept the session.
    pub connect_timeout: Duration,
    /// How long the network task gets to flush DISCONNECT before it is cancelled.
    pub disconnect_grace: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(5),
            disconnect_grace: Duration::from_secs(2),
        }
    }
}

/// Runs one harness session from connect to disconnect.
///
/// The network service starts first. Once the broker accepts the session the
/// auto-publisher starts and the operator menu is shown. Shutdown always runs
/// in the same order: auto-publisher stopped, DISCONNECT sent, network task
/// joined.
pub struct SessionCoordinator {
    task_manager: TaskManager,
    event_bus: EventBus,
    state: Arc<AppState>,
    display: Arc<dyn DisplaySink>,
    settings: SessionSettings,
}

impl SessionCoordinator {
    pub fn new(
        state: Arc<AppState>,
        display: Arc<dyn DisplaySink>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            task_manager: TaskManager::new(),
            event_bus: EventBus::new(),
            state,
            display,
            settings,
        }
    }

    /// Runs the session until the operator quits, input ends, Ctrl+C arrives
    /// or the connection is lost. Only the last one is an error once the
    /// session is up.
    pub async fn run<S>(
        &mut self,
        broker: Arc<dyn Broker>,
        driver: Box<dyn ConnectionDriver>,
        mut commands: S,
    ) -> Result<()>
    where
        S: Stream<Item = String> + Unpin + Send,
    {
        let mut events = self.event_bus.subscribe();

        let controller = Arc::new(SubscriptionController::new(
            self.state.subscriptions.clone(),
            self.display.clone(),
        ));
        NetworkServiceProvider::new(driver, broker.clone(), controller, self.event_bus.clone())
            .start(&mut self.task_manager)
            .context("Failed to start network service")?;

        if let Err(e) = self.await_connection(&mut events).await {
            self.stop_all().await;
            return Err(e);
        }

        let publisher = AutoPublisherServiceProvider::new(
            self.state.clone(),
            broker.clone(),
            self.settings.tick,
        );
        if let Err(e) = publisher.start(&mut self.task_manager) {
            self.shutdown(broker.as_ref()).await;
            return Err(e).context("Failed to start auto-publisher");
        }

        for line in render_menu(&self.state.actuators) {
            self.display.notice(&line);
        }

        let overrides = ManualOverride::new(self.state.clone(), broker.clone());
        let result = self
            .run_command_loop(
                &overrides,
                &mut commands,
                &mut events,
                tokio::signal::ctrl_c(),
            )
            .await;

        self.shutdown(broker.as_ref()).await;
        result
    }

    async fn await_connection(&self, events: &mut broadcast::Receiver<Event>) -> Result<()> {
        let timeout = self.settings.connect_timeout;
        let outcome = tokio::time::timeout(timeout, async {
            loop {
                match events.recv().await {
                    Ok(Event::Connected) => return Ok(()),
                    Ok(Event::ConnectionFailed(reason)) => {
                        bail!("Connection to broker failed: {reason}")
                    }
                    Ok(event) => info!("Ignoring {event:?} while connecting"),
                    Err(RecvError::Lagged(n)) => warn!("Event bus lagged by {n} messages"),
                    Err(RecvError::Closed) => bail!("Event bus closed while connecting"),
                }
            }
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                self.display
                    .notice(&format!("Failed to connect: no answer within {timeout:?}"));
                Err(anyhow!("Timed out after {timeout:?} waiting for the broker"))
            }
        }
    }

    /// `shutdown` is armed once for the whole loop and resolves on Ctrl+C.
    async fn run_command_loop<S, F>(
        &self,
        overrides: &ManualOverride,
        commands: &mut S,
        events: &mut broadcast::Receiver<Event>,
        shutdown: F,
    ) -> Result<()>
    where
        S: Stream<Item = String> + Unpin + Send,
        F: Future<Output = io::Result<()>>,
    {
        info!("Waiting for operator commands");
        self.display.prompt();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = &mut shutdown => {
                    match result {
                        Ok(()) => {
                            info!("Received Ctrl+C, initiating graceful shutdown...");
                            return Ok(());
                        }
                        Err(e) => bail!("Failed to listen for shutdown signal: {e}"),
                    }
                }

                event = events.recv() => match event {
                    Ok(Event::ConnectionLost(reason)) => {
                        self.display.notice(&format!("\nConnection lost: {reason}"));
                        bail!("Connection to broker lost: {reason}");
                    }
                    Ok(event) => info!("Received event: {event:?}"),
                    Err(RecvError::Lagged(n)) => warn!("Event bus lagged by {n} messages"),
                    Err(RecvError::Closed) => bail!("Event bus channel closed unexpectedly"),
                },

                line = commands.next() => {
                    let Some(line) = line else {
                        info!("Operator input closed");
                        return Ok(());
                    };
                    match overrides.handle_line(&line) {
                        Outcome::Quit => return Ok(()),
                        Outcome::Ignored => {}
                        Outcome::Applied(report) => self.display.notice(&report.to_string()),
                        Outcome::Rejected(e) => self.display.notice(&format!("   ! {e}")),
                    }
                    self.display.prompt();
                }
            }
        }
    }

    async fn shutdown(&mut self, broker: &dyn Broker) {
        info!("Initiating graceful shutdown...");
        self.display.notice("\nStopping...");

        if self.task_manager.is_running(AUTO_PUBLISHER) {
            if let Err(e) = self.task_manager.stop_task(AUTO_PUBLISHER).await {
                error!("Error stopping auto-publisher: {e:#}");
            }
        }

        if self.task_manager.is_running(NETWORK_SERVICE) {
            match broker.disconnect().await {
                Ok(()) => {
                    if let Err(e) = self
                        .task_manager
                        .finish_task(NETWORK_SERVICE, self.settings.disconnect_grace)
                        .await
                    {
                        warn!("Network service ended with error: {e:#}");
                    }
                }
                Err(e) => warn!("Failed to disconnect cleanly: {e:#}"),
            }
        }

        self.stop_all().await;
        self.display.notice("Disconnected");
        info!("Shutdown complete");
    }

    async fn stop_all(&mut self) {
        if let Err(e) = self.task_manager.shutdown_all().await {
            warn!("Error during task shutdown: {e:#}");
        }
    }

    /// Returns a reference to the EventBus for testing purposes.
    #[cfg(test)]
    pub const fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }
}
