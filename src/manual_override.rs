//! Operator commands that override actuator values.
//!
//! An override writes the store first and then publishes out of band. The
//! auto-publisher keeps re-sending the stored value afterwards, so a failed
//! immediate publish is still delivered on the actuator's next tick.

use std::{fmt, sync::Arc};

use log::{info, warn};
use thiserror::Error;

use crate::{app_context::AppState, broker::Broker};

/// Operator input that was understood but cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Usage: <index> <value>")]
    Usage,
    #[error("Invalid index {index} ({count} actuators available)")]
    InvalidIndex { index: i64, count: usize },
    #[error("Value '{0}' is not a number")]
    InvalidValue(String),
}

/// A parsed operator line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    /// Blank line; nothing to do.
    Empty,
    Override { index: i64, value: String },
}

/// Parses `q`, a blank line, or `<index> <value>`.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }
    if line.eq_ignore_ascii_case("q") {
        return Ok(Command::Quit);
    }

    let mut parts = line.split_whitespace();
    let (Some(index), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(CommandError::Usage);
    };

    let index = index.parse::<i64>().map_err(|_| CommandError::Usage)?;
    if !value.parse::<f64>().is_ok_and(f64::is_finite) {
        return Err(CommandError::InvalidValue(value.to_string()));
    }

    Ok(Command::Override {
        index,
        value: value.to_string(),
    })
}

/// Result of an applied override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideReport {
    pub topic: String,
    pub value: String,
    /// Set when the immediate publish could not be queued.
    pub publish_error: Option<String>,
}

impl fmt::Display for OverrideReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.publish_error {
            None => write!(
                f,
                "   > Manual publish: {} = {} (will auto-republish)",
                self.topic, self.value
            ),
            Some(e) => write!(
                f,
                "   ! Stored {} = {} but publish failed: {e} (retrying on next tick)",
                self.topic, self.value
            ),
        }
    }
}

/// What the session should do after a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Quit,
    Ignored,
    Applied(OverrideReport),
    Rejected(CommandError),
}

/// Applies operator overrides to the store and the broker.
pub struct ManualOverride {
    state: Arc<AppState>,
    broker: Arc<dyn Broker>,
}

impl ManualOverride {
    pub fn new(state: Arc<AppState>, broker: Arc<dyn Broker>) -> Self {
        Self { state, broker }
    }

    /// Parses and applies one operator line. Never fails the session.
    pub fn handle_line(&self, line: &str) -> Outcome {
        match parse_command(line) {
            Ok(Command::Quit) => Outcome::Quit,
            Ok(Command::Empty) => Outcome::Ignored,
            Ok(Command::Override { index, value }) => match self.apply(index, &value) {
                Ok(report) => Outcome::Applied(report),
                Err(e) => Outcome::Rejected(e),
            },
            Err(e) => Outcome::Rejected(e),
        }
    }

    /// Stores `value` for the actuator at `index` and publishes it right away.
    pub fn apply(&self, index: i64, value: &str) -> Result<OverrideReport, CommandError> {
        let actuator = usize::try_from(index)
            .ok()
            .and_then(|idx| self.state.actuator(idx))
            .ok_or(CommandError::InvalidIndex {
                index,
                count: self.state.actuators.len(),
            })?;

        self.state.store.set(actuator.topic.clone(), value);

        let publish_error = match self.broker.publish(&actuator.topic, value) {
            Ok(()) => {
                info!("Manual override: {} = {value}", actuator.topic);
                None
            }
            Err(e) => {
                warn!("Manual publish on {} failed: {e:#}", actuator.topic);
                Some(format!("{e:#}"))
            }
        };

        Ok(OverrideReport {
            topic: actuator.topic.clone(),
            value: value.to_string(),
            publish_error,
        })
    }
}
