//! # mqtt_harness
//!
//! An interactive MQTT test harness for an IoT device that drives actuators
//! (relays, fans, PWM and analog outputs) from MQTT commands.
//!
//! ## Features
//!
//! - **Topic derivation**: Device topics computed from the pin topology file
//! - **Keep-alive publishing**: Every actuator's value is re-sent before the
//!   device's watchdog interval expires
//! - **Manual override**: Operator commands change an actuator's value; the
//!   new value persists in later keep-alive publishes
//! - **Live view**: Sensor and actuator state reports are printed as they arrive
//!
//! ## Architecture
//!
//! - [`SessionCoordinator`](coordinator::SessionCoordinator) - Session lifecycle
//! - [`TaskManager`](task_manager::TaskManager) - Named, cancellable background tasks
//! - [`EventBus`](event::EventBus) - Connection events from the network task
//! - [`AppState`](app_context::AppState) - Derived topics and the shared value store
//! - [`Broker`](broker::Broker) / [`ConnectionDriver`](broker::ConnectionDriver) -
//!   Seams around the MQTT client
//!
//! ## Example
//!
//! ```no_run
//! use mqtt_harness::{application::Application, config::{ConfigManager, ConfigPaths}};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config_manager = ConfigManager::load(ConfigPaths::default())?;
//!     Application::builder()
//!         .with_config_manager(config_manager)
//!         .build()?
//!         .run()
//!         .await
//! }
//! ```

pub mod app_context;
pub mod application;
pub mod broker;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod display;
pub mod event;
pub mod manual_override;
pub mod mqtt;
pub mod providers;
pub mod schedule;
pub mod store;
pub mod subscriptions;
pub mod task_manager;
pub mod topics;

#[cfg(test)]
mod testing;
