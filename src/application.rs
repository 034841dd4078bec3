//! Application entry point and builder pattern implementation.

use std::{
    io::{self, BufRead, ErrorKind},
    sync::Arc,
    thread,
};

use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    app_context::AppState,
    config::ConfigManager,
    coordinator::{SessionCoordinator, SessionSettings},
    display::{ConsoleDisplay, DisplaySink},
    mqtt,
};

/// Lines buffered between the stdin reader and the session.
const INPUT_BUFFER: usize = 16;

/// Wires configuration, the MQTT client and the console into one session.
///
/// # Example
///
/// ```no_run
/// use mqtt_harness::application::Application;
/// use mqtt_harness::config::{ConfigManager, ConfigPaths};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config_manager = ConfigManager::load(ConfigPaths::default())?;
/// let mut app = Application::builder()
///     .with_config_manager(config_manager)
///     .build()?;
///
/// app.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Application {
    config_manager: ConfigManager,
    settings: SessionSettings,
    display: Arc<dyn DisplaySink>,
}

impl Application {
    /// Creates a new ApplicationBuilder for constructing Application instances.
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Connects to the broker and runs the session until it ends.
    pub async fn run(&mut self) -> Result<()> {
        let config = self.config_manager.shared();
        let state = Arc::new(AppState::new(&config));

        self.print_banner();

        let (broker, driver) = mqtt::connect(&config.broker);
        let commands = spawn_stdin_reader()?;

        let mut coordinator = SessionCoordinator::new(state, self.display.clone(), self.settings);
        coordinator
            .run(Arc::new(broker), Box::new(driver), commands)
            .await
    }

    fn print_banner(&self) {
        let config = self.config_manager.get();
        self.display.notice("MQTT actuator test harness");
        self.display.notice(&format!(
            "   Pins:   {}",
            self.config_manager.pins_path().display()
        ));
        self.display.notice(&format!(
            "   MQTT:   {}",
            self.config_manager.broker_path().display()
        ));
        self.display.notice(&format!(
            "   Broker: {}:{}",
            config.broker.host, config.broker.port
        ));
        self.display
            .notice(&format!("   Client: {}", config.broker.client_id));
        self.display.notice("");
    }
}

/// Reads operator lines on a dedicated thread so a blocked stdin never stalls
/// the runtime. The stream ends when stdin closes.
fn spawn_stdin_reader() -> Result<ReceiverStream<String>> {
    let (tx, rx) = mpsc::channel(INPUT_BUFFER);

    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || forward_lines(io::stdin().lock(), tx))
        .map_err(|e| anyhow!("Failed to start stdin reader: {e}"))?;

    info!("Reading operator commands from stdin");
    Ok(ReceiverStream::new(rx))
}

/// Sends every line of `reader` to `tx` until end of input or until the
/// session drops the receiver. Bytes that are not UTF-8 become U+FFFD so a
/// stray keystroke is rejected as a command instead of ending the session.
fn forward_lines<R: BufRead>(mut reader: R, tx: mpsc::Sender<String>) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Failed to read operator input: {e}");
                break;
            }
        }
    }
    debug!("stdin reader finished");
}

/// Builder pattern for creating Application instances.
///
/// Provides a fluent interface for configuring the application before startup.
pub struct ApplicationBuilder {
    config_manager: Option<ConfigManager>,
    settings: SessionSettings,
    display: Option<Arc<dyn DisplaySink>>,
}

impl ApplicationBuilder {
    fn new() -> Self {
        Self {
            config_manager: None,
            settings: SessionSettings::default(),
            display: None,
        }
    }

    /// Sets the configuration manager for the application.
    pub fn with_config_manager(mut self, config_manager: ConfigManager) -> Self {
        self.config_manager = Some(config_manager);
        self
    }

    pub fn with_session_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replaces the console output.
    pub fn with_display(mut self, display: Arc<dyn DisplaySink>) -> Self {
        self.display = Some(display);
        self
    }

    /// Builds the Application instance with the provided configuration.
    pub fn build(self) -> Result<Application> {
        let config_manager = self
            .config_manager
            .ok_or_else(|| anyhow!("Configuration manager is required"))?;

        Ok(Application {
            config_manager,
            settings: self.settings,
            display: self.display.unwrap_or_else(|| Arc::new(ConsoleDisplay)),
        })
    }
}
