//! Configuration management for the harness.
//!
//! Reads the same files the device flashes from its data directory: a pin
//! topology (`pin_config.json`) and broker settings (`mqtt_config.json`).
//! YAML variants of both are accepted when the file ends in `.yml`/`.yaml`.

use std::{
    collections::HashSet,
    env, fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{store::DEFAULT_VALUE, topics::PinMode};

/// Environment variable overriding the pin topology location.
pub const PIN_CONFIG_ENV: &str = "MQTT_HARNESS_PIN_CONFIG";
/// Environment variable overriding the broker settings location.
pub const MQTT_CONFIG_ENV: &str = "MQTT_HARNESS_MQTT_CONFIG";

const DEFAULT_PIN_CONFIG: &str = "../iot-device/data/pin_config.json";
const DEFAULT_MQTT_CONFIG: &str = "../iot-device/data/mqtt_config.json";

/// One declared device channel.
///
/// # Example
///
/// ```json
/// { "pin": 16, "mode": "OUTPUT_DIGITAL", "name": "relay1",
///   "defaultState": 0, "pollingInterval": 5000 }
/// ```
///
/// Device-only keys such as `pin` or `inverted` are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinDeclaration {
    pub name: String,
    pub mode: PinMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_state: Option<StateValue>,
    /// Device watchdog / sampling period in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval: Option<u64>,
}

impl PinDeclaration {
    /// Initial actuator value as sent on the wire.
    pub fn default_value(&self) -> String {
        self.default_state
            .as_ref()
            .map_or_else(|| DEFAULT_VALUE.to_string(), ToString::to_string)
    }
}

/// `defaultState` as written in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Bool(on) => f.write_str(if *on { "1" } else { "0" }),
            StateValue::Integer(v) => write!(f, "{v}"),
            StateValue::Float(v) => write!(f, "{v}"),
            StateValue::Text(v) => f.write_str(v),
        }
    }
}

/// Broker connection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerConfig {
    pub host: String,

    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Device client id; also the first topic segment.
    pub client_id: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "defaults::keep_alive_seconds")]
    pub keep_alive_seconds: u64,
}

/// Complete harness configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub pins: Vec<PinDeclaration>,
    pub broker: BrokerConfig,
}

impl Config {
    /// Checks the invariants the rest of the harness relies on.
    ///
    /// Rejects duplicate `(mode, name)` pairs so two pins can never share a
    /// `set` topic.
    pub fn validate(&self) -> Result<()> {
        if self.broker.host.trim().is_empty() {
            anyhow::bail!("Broker host must not be empty");
        }
        if self.broker.client_id.trim().is_empty() {
            anyhow::bail!("Broker clientId must not be empty");
        }
        if self.broker.keep_alive_seconds < defaults::MIN_KEEP_ALIVE_SECONDS {
            anyhow::bail!(
                "keepAliveSeconds must be at least {}, got {}",
                defaults::MIN_KEEP_ALIVE_SECONDS,
                self.broker.keep_alive_seconds
            );
        }

        let mut seen = HashSet::new();
        for (idx, pin) in self.pins.iter().enumerate() {
            if pin.name.trim().is_empty() {
                anyhow::bail!("Pin #{idx} ({}) has an empty name", pin.mode);
            }
            if !seen.insert((pin.mode.clone(), pin.name.as_str())) {
                anyhow::bail!("Pin '{}' is declared twice with mode {}", pin.name, pin.mode);
            }
        }

        Ok(())
    }
}

mod defaults {
    pub const MIN_KEEP_ALIVE_SECONDS: u64 = 5;

    pub fn port() -> u16 {
        1883
    }

    pub fn keep_alive_seconds() -> u64 {
        60
    }
}

/// Explicit file locations, usually from the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    pub pins: Option<PathBuf>,
    pub broker: Option<PathBuf>,
}

/// Picks the first of: explicit path, environment variable, built-in default.
fn locate_config(explicit: Option<PathBuf>, env_var: &str, default: &str) -> PathBuf {
    explicit
        .or_else(|| env::var_os(env_var).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(default))
}

/// Loaded configuration together with the files it came from.
///
/// # Example
///
/// ```no_run
/// use mqtt_harness::config::{ConfigManager, ConfigPaths};
///
/// # fn example() -> anyhow::Result<()> {
/// let manager = ConfigManager::load(ConfigPaths::default())?
///     .with_broker_overrides(Some("localhost".into()), None)?;
/// println!("{} pins", manager.get().pins.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<Config>,
    pins_path: PathBuf,
    broker_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config: Config, pins_path: PathBuf, broker_path: PathBuf) -> Self {
        Self {
            config: Arc::new(config),
            pins_path,
            broker_path,
        }
    }

    /// Loads and validates both files.
    ///
    /// Each path is resolved as: given path, then `MQTT_HARNESS_PIN_CONFIG` /
    /// `MQTT_HARNESS_MQTT_CONFIG`, then the device data directory.
    pub fn load(paths: ConfigPaths) -> Result<Self> {
        let pins_path = locate_config(paths.pins, PIN_CONFIG_ENV, DEFAULT_PIN_CONFIG);
        let broker_path = locate_config(paths.broker, MQTT_CONFIG_ENV, DEFAULT_MQTT_CONFIG);

        info!("Loading pin topology from: {}", pins_path.display());
        let pins: Vec<PinDeclaration> = parse_file(&pins_path)?;

        info!("Loading broker settings from: {}", broker_path.display());
        let broker: BrokerConfig = parse_file(&broker_path)?;

        let config = Config { pins, broker };
        config.validate().with_context(|| {
            format!(
                "Configuration validation failed for: {} / {}",
                pins_path.display(),
                broker_path.display()
            )
        })?;

        Ok(Self::new(config, pins_path, broker_path))
    }

    /// Applies `--host`/`--port` on top of the broker file.
    pub fn with_broker_overrides(self, host: Option<String>, port: Option<u16>) -> Result<Self> {
        if host.is_none() && port.is_none() {
            return Ok(self);
        }

        let mut config = (*self.config).clone();
        if let Some(host) = host {
            config.broker.host = host;
        }
        if let Some(port) = port {
            config.broker.port = port;
        }
        config
            .validate()
            .context("Broker overrides produced an invalid configuration")?;

        Ok(Self::new(config, self.pins_path, self.broker_path))
    }

    pub fn get(&self) -> &Config {
        &self.config
    }

    pub fn shared(&self) -> Arc<Config> {
        self.config.clone()
    }

    pub fn pins_path(&self) -> &Path {
        &self.pins_path
    }

    pub fn broker_path(&self) -> &Path {
        &self.broker_path
    }
}

fn parse_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"));

    if is_yaml {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON in: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn create_temp_config(content: &str, suffix: &str) -> NamedTempFile {
        let mut temp_file = Builder::new().suffix(suffix).tempfile().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    fn broker() -> BrokerConfig {
        BrokerConfig {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "dev1".to_string(),
            username: None,
            password: None,
            keep_alive_seconds: 60,
        }
    }

    fn pin(name: &str, mode: PinMode) -> PinDeclaration {
        PinDeclaration {
            name: name.to_string(),
            mode,
            default_state: None,
            polling_interval: None,
        }
    }

    const PINS_JSON: &str = r#"[
        { "pin": 16, "mode": "OUTPUT_DIGITAL", "name": "relay1", "defaultState": 0, "pollingInterval": 5000, "inverted": true },
        { "pin": 4, "pinRelay2": 5, "pinRelay3": 17, "mode": "FAN", "name": "fan1", "defaultState": 2 },
        { "pin": 13, "pinClock": 14, "pinData": 12, "mode": "THERMOCOUPLE", "name": "flue", "pollingInterval": 2000 }
    ]"#;

    const MQTT_JSON: &str = r#"{ "host": "192.168.1.10", "clientId": "dev1", "username": "u", "password": "p" }"#;

    #[test]
    fn config_load_device_json_files() {
        let pins = create_temp_config(PINS_JSON, ".json");
        let mqtt = create_temp_config(MQTT_JSON, ".json");

        let manager = ConfigManager::load(ConfigPaths {
            pins: Some(pins.path().to_path_buf()),
            broker: Some(mqtt.path().to_path_buf()),
        })
        .unwrap();
        let config = manager.get();

        assert_eq!(config.pins.len(), 3);
        assert_eq!(config.pins[0].mode, PinMode::OutputDigital);
        assert_eq!(config.pins[0].polling_interval, Some(5000));
        assert_eq!(config.pins[1].default_value(), "2");
        assert_eq!(config.pins[2].default_state, None);
        assert_eq!(config.broker.host, "192.168.1.10");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.keep_alive_seconds, 60);
        assert_eq!(config.broker.username.as_deref(), Some("u"));
        assert_eq!(manager.pins_path(), pins.path());
        assert_eq!(manager.broker_path(), mqtt.path());
    }

    #[test]
    fn config_load_yaml_by_extension() {
        let pins = create_temp_config(
            "- name: relay1\n  mode: OUTPUT_DIGITAL\n  defaultState: 1\n",
            ".yml",
        );
        let mqtt = create_temp_config("host: broker\nport: 1884\nclientId: dev2\n", ".yaml");

        let manager = ConfigManager::load(ConfigPaths {
            pins: Some(pins.path().to_path_buf()),
            broker: Some(mqtt.path().to_path_buf()),
        })
        .unwrap();

        assert_eq!(manager.get().pins[0].default_value(), "1");
        assert_eq!(manager.get().broker.port, 1884);
        assert_eq!(manager.get().broker.client_id, "dev2");
    }

    #[test]
    fn config_load_missing_file_fails() {
        let mqtt = create_temp_config(MQTT_JSON, ".json");
        let result = ConfigManager::load(ConfigPaths {
            pins: Some(PathBuf::from("/nonexistent/pin_config.json")),
            broker: Some(mqtt.path().to_path_buf()),
        });

        let error = format!("{:#}", result.unwrap_err());
        assert!(error.contains("Failed to read config file"), "{error}");
    }

    #[test]
    fn config_load_malformed_json_fails() {
        let pins = create_temp_config("[{ \"name\": ", ".json");
        let mqtt = create_temp_config(MQTT_JSON, ".json");
        let result = ConfigManager::load(ConfigPaths {
            pins: Some(pins.path().to_path_buf()),
            broker: Some(mqtt.path().to_path_buf()),
        });

        assert!(format!("{:#}", result.unwrap_err()).contains("Failed to parse JSON"));
    }

    #[test]
    fn config_validate_rejects_duplicate_pins() {
        let config = Config {
            pins: vec![
                pin("relay1", PinMode::OutputDigital),
                pin("relay1", PinMode::OutputDigital),
            ],
            broker: broker(),
        };

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("declared twice"));
    }

    #[test]
    fn config_validate_allows_same_name_in_different_modes() {
        let config = Config {
            pins: vec![pin("main", PinMode::OutputDigital), pin("main", PinMode::Fan)],
            broker: broker(),
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_validate_rejects_empty_client_id() {
        let config = Config {
            pins: vec![],
            broker: BrokerConfig {
                client_id: " ".to_string(),
                ..broker()
            },
        };

        assert!(config.validate().unwrap_err().to_string().contains("clientId"));
    }

    #[test]
    fn config_validate_rejects_short_keep_alive() {
        let config = Config {
            pins: vec![],
            broker: BrokerConfig {
                keep_alive_seconds: 1,
                ..broker()
            },
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn broker_overrides_replace_host_and_port() {
        let manager = ConfigManager::new(
            Config {
                pins: vec![],
                broker: broker(),
            },
            PathBuf::from("pins.json"),
            PathBuf::from("mqtt.json"),
        )
        .with_broker_overrides(Some("10.0.0.2".to_string()), Some(8883))
        .unwrap();

        assert_eq!(manager.get().broker.host, "10.0.0.2");
        assert_eq!(manager.get().broker.port, 8883);
        assert_eq!(manager.get().broker.client_id, "dev1");
    }

    #[test]
    fn state_values_render_for_the_wire() {
        assert_eq!(StateValue::Integer(0).to_string(), "0");
        assert_eq!(StateValue::Float(1.5).to_string(), "1.5");
        assert_eq!(StateValue::Bool(true).to_string(), "1");
        assert_eq!(StateValue::Text("on".into()).to_string(), "on");
        assert_eq!(pin("x", PinMode::Fan).default_value(), "0");
    }

    #[test]
    fn explicit_path_wins_over_default() {
        let path = locate_config(
            Some(PathBuf::from("/tmp/p.json")),
            PIN_CONFIG_ENV,
            DEFAULT_PIN_CONFIG,
        );
        assert_eq!(path, PathBuf::from("/tmp/p.json"));
    }

    #[test]
    #[serial]
    fn environment_variable_locates_config() {
        // SAFETY: serialized with every other test touching the environment.
        unsafe { env::set_var(MQTT_CONFIG_ENV, "/etc/harness/mqtt.yml") };
        let path = locate_config(None, MQTT_CONFIG_ENV, DEFAULT_MQTT_CONFIG);
        unsafe { env::remove_var(MQTT_CONFIG_ENV) };

        assert_eq!(path, PathBuf::from("/etc/harness/mqtt.yml"));
    }

    #[test]
    #[serial]
    fn default_location_is_device_data_dir() {
        // SAFETY: serialized with every other test touching the environment.
        unsafe { env::remove_var(PIN_CONFIG_ENV) };
        let path = locate_config(None, PIN_CONFIG_ENV, DEFAULT_PIN_CONFIG);

        assert_eq!(path, PathBuf::from("../iot-device/data/pin_config.json"));
    }
}
