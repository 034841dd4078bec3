//! Keep-alive schedule for actuator `set` topics.
//!
//! The device reverts an actuator when no command arrives within its
//! `pollingInterval`, so the harness re-sends one second earlier than that.

use std::time::Duration;

use tokio::time::Instant;

/// Polling interval assumed for pins that declare none.
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 30_000;

const WATCHDOG_MARGIN: Duration = Duration::from_secs(1);
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Re-send interval for a declared `pollingInterval`: `max(1s, polling - 1s)`.
///
/// Values below 2s all collapse onto the 1s floor, so very short watchdogs
/// get more traffic than they declared.
pub fn keep_alive_interval(polling_interval_ms: Option<u64>) -> Duration {
    let polling =
        Duration::from_millis(polling_interval_ms.unwrap_or(DEFAULT_POLLING_INTERVAL_MS));
    polling.saturating_sub(WATCHDOG_MARGIN).max(MIN_INTERVAL)
}

/// One actuator's slot in the auto-publisher.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub topic: String,
    pub interval: Duration,
    last_sent: Option<Instant>,
}

impl ScheduleEntry {
    pub fn new(topic: impl Into<String>, interval: Duration) -> Self {
        Self {
            topic: topic.into(),
            interval,
            last_sent: None,
        }
    }

    /// An entry that never fired is due immediately.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_sent {
            None => true,
            Some(sent) => now.saturating_duration_since(sent) >= self.interval,
        }
    }

    pub fn mark_sent(&mut self, now: Instant) {
        self.last_sent = Some(now);
    }

    pub fn last_sent(&self) -> Option<Instant> {
        self.last_sent
    }
}
