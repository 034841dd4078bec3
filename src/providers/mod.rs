//! Background services started through the [`TaskManager`](crate::task_manager::TaskManager).
//!
//! The network service owns the MQTT event loop; the auto-publisher keeps the
//! device's actuator watchdogs fed.

pub mod auto_publisher;
pub mod network;
pub mod traits;

pub use auto_publisher::{AUTO_PUBLISHER, AutoPublisherServiceProvider};
pub use network::{NETWORK_SERVICE, NetworkServiceProvider};
pub use traits::ServiceProvider;
