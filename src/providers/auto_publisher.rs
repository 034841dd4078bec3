use anyhow::Result;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState, broker::Broker, providers::traits::ServiceProvider,
    schedule::ScheduleEntry, store::ActuatorStore, task_manager::TaskManager,
};

/// Task name of the keep-alive publisher.
pub const AUTO_PUBLISHER: &str = "AutoPublisher";

/// Keep-alive publisher service provider.
///
/// Re-sends every actuator's stored value on its `set` topic whenever its
/// interval has elapsed, so the device's watchdog never fires. The first scan
/// publishes every actuator at once.
///
/// # Example
///
/// ```no_run
/// use std::{sync::Arc, time::Duration};
/// use mqtt_harness::app_context::AppState;
/// use mqtt_harness::broker::Broker;
/// use mqtt_harness::providers::{AutoPublisherServiceProvider, ServiceProvider};
/// use mqtt_harness::task_manager::TaskManager;
///
/// # fn example(state: Arc<AppState>, broker: Arc<dyn Broker>) -> anyhow::Result<()> {
/// let mut task_manager = TaskManager::new();
/// let provider = AutoPublisherServiceProvider::new(state, broker, Duration::from_millis(100));
/// provider.start(&mut task_manager)?;
/// # Ok(())
/// # }
/// ```
pub struct AutoPublisherServiceProvider {
    state: Arc<AppState>,
    broker: Arc<dyn Broker>,
    tick: Duration,
}

impl AutoPublisherServiceProvider {
    /// `tick` is how often the schedule is scanned.
    pub fn new(state: Arc<AppState>, broker: Arc<dyn Broker>, tick: Duration) -> Self {
        Self {
            state,
            broker,
            tick,
        }
    }
}

impl ServiceProvider for AutoPublisherServiceProvider {
    fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let entries = self.state.schedule();
        let store = self.state.store.clone();
        let broker = self.broker.clone();
        let tick = self.tick;

        task_manager.spawn_task(self.name().to_string(), move |cancel_token| async move {
            run_auto_publisher(entries, store, broker, tick, cancel_token).await
        })
    }

    fn name(&self) -> &'static str {
        AUTO_PUBLISHER
    }
}

async fn run_auto_publisher(
    mut entries: Vec<ScheduleEntry>,
    store: Arc<ActuatorStore>,
    broker: Arc<dyn Broker>,
    tick: Duration,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!(
        "Auto-publisher started: {} actuators, scanning every {tick:?}",
        entries.len()
    );

    let mut interval = interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel_token.cancelled() => {
                info!("Auto-publisher cancelled");
                break;
            }
            _instant = interval.tick() => {
                publish_due(&mut entries, &store, broker.as_ref(), Instant::now());
            }
        }
    }
    Ok(())
}

/// Publishes every entry due at `now` and restarts its interval.
///
/// A failed publish still counts as sent; the next attempt comes one interval
/// later. Returns how many entries were attempted.
fn publish_due(
    entries: &mut [ScheduleEntry],
    store: &ActuatorStore,
    broker: &dyn Broker,
    now: Instant,
) -> usize {
    let mut attempted = 0;
    for entry in entries.iter_mut().filter(|entry| entry.is_due(now)) {
        let value = store.get(&entry.topic);
        match broker.publish(&entry.topic, &value) {
            Ok(()) => debug!("Auto-publish {} = {value}", entry.topic),
            Err(e) => debug!("Auto-publish on {} failed: {e:#}", entry.topic),
        }
        entry.mark_sent(now);
        attempted += 1;
    }
    attempted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingBroker, single_relay, topology};
    use pretty_assertions::assert_eq;
    use tokio::time::sleep;

    const RELAY: &str = "/dev1/digital_output/relay1/set";
    const FAN: &str = "/dev1/fan/fan1/set";
    const TICK: Duration = Duration::from_millis(100);

    fn spawn(
        state: Arc<AppState>,
        broker: Arc<RecordingBroker>,
    ) -> (TaskManager, AutoPublisherServiceProvider) {
        let mut task_manager = TaskManager::new();
        let provider = AutoPublisherServiceProvider::new(state, broker, TICK);
        provider.start(&mut task_manager).unwrap();
        (task_manager, provider)
    }

    #[tokio::test(start_paused = true)]
    async fn first_scan_publishes_every_actuator() {
        let state = Arc::new(AppState::new(&topology()));
        let broker = RecordingBroker::new();
        let start = Instant::now();
        let (mut task_manager, _) = spawn(state, broker.clone());

        sleep(Duration::from_millis(50)).await;

        let published = broker.published();
        assert_eq!(published.len(), 2);
        assert!(published.iter().all(|p| p.at == start));
        assert_eq!(broker.published_on(RELAY)[0].payload, "0");
        assert_eq!(broker.published_on(FAN)[0].payload, "2");

        task_manager.shutdown_all().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn publish_count_tracks_interval() {
        let state = Arc::new(AppState::new(&single_relay()));
        let broker = RecordingBroker::new();
        let (mut task_manager, _) = spawn(state, broker.clone());

        // 4 s interval over 20 s.
        sleep(Duration::from_secs(20)).await;
        task_manager.stop_task(AUTO_PUBLISHER).await.unwrap();

        let count = broker.published_on(RELAY).len();
        assert!((4..=6).contains(&count), "published {count} times");

        let gaps: Vec<Duration> = broker
            .published_on(RELAY)
            .windows(2)
            .map(|pair| pair[1].at - pair[0].at)
            .collect();
        assert!(
            gaps.iter()
                .all(|gap| *gap >= Duration::from_secs(4) && *gap < Duration::from_secs(4) + TICK),
            "gaps: {gaps:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stored_override_is_republished() {
        let state = Arc::new(AppState::new(&single_relay()));
        let broker = RecordingBroker::new();
        let (mut task_manager, _) = spawn(state.clone(), broker.clone());

        sleep(Duration::from_millis(50)).await;
        state.store.set(RELAY, "42");
        sleep(Duration::from_secs(9)).await;
        task_manager.shutdown_all().await.unwrap();

        let payloads: Vec<String> = broker
            .published_on(RELAY)
            .into_iter()
            .map(|p| p.payload)
            .collect();
        assert_eq!(payloads, vec!["0", "42", "42"]);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_published_after_cancellation() {
        let state = Arc::new(AppState::new(&single_relay()));
        let broker = RecordingBroker::new();
        let (mut task_manager, _) = spawn(state, broker.clone());

        sleep(Duration::from_secs(1)).await;
        let stopped_at = Instant::now();
        task_manager.stop_task(AUTO_PUBLISHER).await.unwrap();
        assert!(Instant::now() - stopped_at <= TICK);

        let before = broker.published().len();
        sleep(Duration::from_secs(30)).await;
        assert_eq!(broker.published().len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_publishes_do_not_stop_the_loop() {
        let state = Arc::new(AppState::new(&single_relay()));
        let broker = RecordingBroker::new();
        broker.set_fail_publish(true);
        let (mut task_manager, _) = spawn(state, broker.clone());

        sleep(Duration::from_secs(5)).await;
        assert!(broker.published().is_empty());
        assert!(task_manager.is_running(AUTO_PUBLISHER));

        broker.set_fail_publish(false);
        sleep(Duration::from_secs(4)).await;
        assert_eq!(broker.published_on(RELAY).len(), 1);

        task_manager.shutdown_all().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failing_topic_does_not_delay_the_others() {
        let state = Arc::new(AppState::new(&topology()));
        let broker = RecordingBroker::new();
        broker.fail_publish_to(FAN);
        let start = Instant::now();
        let (mut task_manager, _) = spawn(state, broker.clone());

        sleep(Duration::from_secs(13)).await;
        task_manager.stop_task(AUTO_PUBLISHER).await.unwrap();

        assert!(broker.published_on(FAN).is_empty());
        let offsets: Vec<Duration> = broker
            .published_on(RELAY)
            .iter()
            .map(|p| p.at - start)
            .collect();
        assert_eq!(offsets.len(), 4, "offsets: {offsets:?}");
        for (n, offset) in (0u32..).zip(&offsets) {
            let due = Duration::from_secs(4) * n;
            assert!(*offset >= due && *offset < due + TICK, "offsets: {offsets:?}");
        }
    }

    #[test]
    fn publish_due_skips_entries_inside_their_interval() {
        let store = ActuatorStore::seeded([(RELAY, "1"), (FAN, "3")]);
        let broker = RecordingBroker::new();
        let now = Instant::now();
        let mut entries = vec![
            ScheduleEntry::new(RELAY, Duration::from_secs(4)),
            ScheduleEntry::new(FAN, Duration::from_secs(29)),
        ];
        entries[1].mark_sent(now);

        assert_eq!(publish_due(&mut entries, &store, broker.as_ref(), now), 1);
        assert_eq!(broker.published_on(RELAY)[0].payload, "1");
        assert!(broker.published_on(FAN).is_empty());
        assert_eq!(entries[0].last_sent(), Some(now));
    }
}
