use anyhow::Result;

use crate::task_manager::TaskManager;

/// A background activity that can be started through [`TaskManager`].
///
/// # Example
///
/// ```no_run
/// use mqtt_harness::providers::traits::ServiceProvider;
/// use mqtt_harness::task_manager::TaskManager;
/// use anyhow::Result;
///
/// struct Heartbeat;
///
/// impl ServiceProvider for Heartbeat {
///     fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
///         task_manager.spawn_task(self.name().to_string(), |token| async move {
///             token.cancelled().await;
///             Ok(())
///         })
///     }
///
///     fn name(&self) -> &'static str { "Heartbeat" }
/// }
/// ```
pub trait ServiceProvider: Send + Sync {
    /// Spawns the service's task under [`ServiceProvider::name`].
    fn start(&self, task_manager: &mut TaskManager) -> Result<()>;

    /// Task name used for logging and for stopping the service.
    fn name(&self) -> &'static str;
}
