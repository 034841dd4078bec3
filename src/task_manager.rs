//! Named background tasks with cancellation and bounded joins.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Upper bound on how long a cancelled task may take to exit.
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the session's background tasks.
///
/// Every task gets a child of `global_token`, so tasks can be stopped one by
/// one in a chosen order or all at once. Cancellation tokens are
/// level-triggered: a task that checks after the cancel still sees it.
pub struct TaskManager {
    tasks: HashMap<String, TaskInfo>,
    pub global_token: CancellationToken,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            global_token: CancellationToken::new(),
        }
    }

    /// Spawns and registers a task with the given name.
    pub fn spawn_task<F, Fut>(&mut self, name: String, task_fn: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        if self.tasks.contains_key(&name) {
            anyhow::bail!("Task '{name}' is already running");
        }

        let task_token = self.global_token.child_token();
        let task_token_clone = task_token.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            info!("Starting task: {task_name}");
            match task_fn(task_token_clone).await {
                Ok(()) => {
                    info!("Task '{task_name}' completed successfully");
                    Ok(())
                }
                Err(e) => {
                    error!("Task '{task_name}' failed: {e:#}");
                    Err(e)
                }
            }
        });

        self.tasks.insert(
            name.clone(),
            TaskInfo {
                handle,
                cancel_token: task_token,
            },
        );

        info!("Task '{name}' spawned");
        Ok(())
    }

    /// Cancels one task and waits for it to exit.
    pub async fn stop_task(&mut self, name: &str) -> Result<()> {
        let task = self
            .tasks
            .remove(name)
            .ok_or_else(|| anyhow!("Task '{name}' is not running"))?;

        info!("Stopping task '{name}'");
        task.cancel_token.cancel();
        join(task.handle)
            .await
            .with_context(|| format!("Task '{name}' did not stop cleanly"))
    }

    /// Gives a task `grace` to finish on its own, then cancels it.
    pub async fn finish_task(&mut self, name: &str, grace: Duration) -> Result<()> {
        let mut task = self
            .tasks
            .remove(name)
            .ok_or_else(|| anyhow!("Task '{name}' is not running"))?;

        match tokio::time::timeout(grace, &mut task.handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(anyhow!("Task '{name}' panicked: {e}")),
            Err(_) => {
                warn!("Task '{name}' still running after {grace:?}; cancelling");
                task.cancel_token.cancel();
                join(task.handle).await
            }
        }
    }

    /// Cancels every remaining task and waits for all of them.
    ///
    /// Returns the first error encountered, if any.
    pub async fn shutdown_all(&mut self) -> Result<()> {
        info!("Stopping all {} tasks", self.tasks.len());

        self.global_token.cancel();

        let mut first_error = None;
        for (name, task) in self.tasks.drain() {
            if let Err(e) = join(task.handle).await {
                warn!("Task '{name}' failed during shutdown: {e:#}");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(error) => Err(error).context("One or more tasks failed during shutdown"),
            None => {
                info!("All tasks stopped");
                Ok(())
            }
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn join(handle: JoinHandle<Result<()>>) -> Result<()> {
    match tokio::time::timeout(JOIN_TIMEOUT, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(anyhow!("Task panicked: {e}")),
        Err(_) => Err(anyhow!("Task shutdown timeout exceeded")),
    }
}

struct TaskInfo {
    handle: JoinHandle<Result<()>>,
    cancel_token: CancellationToken,
}
