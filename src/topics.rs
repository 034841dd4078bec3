//! Topic routing between pin declarations and MQTT topic names.
//!
//! Every device channel lives under `/{client_id}/{prefix}/{name}/{suffix}`,
//! where the prefix is derived from the pin mode and the suffix selects the
//! direction of the channel.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Capability kind of a declared pin.
///
/// Parsed case-insensitively from the topology file. Modes the harness does
/// not know are kept verbatim in [`PinMode::Other`] so topic routing can still
/// fall back to a lower-cased prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PinMode {
    InputDigital,
    OutputDigital,
    Pwm,
    InputAnalog,
    OutputAnalog,
    Dht22Sensor,
    Yl69Sensor,
    Ds18b20,
    Thermocouple,
    Fan,
    Other(String),
}

impl PinMode {
    /// Mode name as written in the topology file.
    pub fn as_str(&self) -> &str {
        match self {
            PinMode::InputDigital => "INPUT_DIGITAL",
            PinMode::OutputDigital => "OUTPUT_DIGITAL",
            PinMode::Pwm => "PWM",
            PinMode::InputAnalog => "INPUT_ANALOG",
            PinMode::OutputAnalog => "OUTPUT_ANALOG",
            PinMode::Dht22Sensor => "DHT22_SENSOR",
            PinMode::Yl69Sensor => "YL_69_SENSOR",
            PinMode::Ds18b20 => "DS18B20",
            PinMode::Thermocouple => "THERMOCOUPLE",
            PinMode::Fan => "FAN",
            PinMode::Other(raw) => raw,
        }
    }

    /// Whether the device accepts commands for this mode on a `set` topic.
    pub fn is_actuator(&self) -> bool {
        matches!(
            self,
            PinMode::OutputDigital | PinMode::Fan | PinMode::Pwm | PinMode::OutputAnalog
        )
    }

    /// Whether the device publishes readings for this mode on a `value` topic.
    pub fn is_sensor(&self) -> bool {
        matches!(
            self,
            PinMode::InputDigital
                | PinMode::InputAnalog
                | PinMode::Dht22Sensor
                | PinMode::Yl69Sensor
                | PinMode::Ds18b20
                | PinMode::Thermocouple
        )
    }

    /// Accepted value range shown in the operator menu.
    ///
    /// Advisory only; the harness forwards whatever number the operator types.
    pub fn value_range(&self) -> Option<&'static str> {
        match self {
            PinMode::OutputDigital => Some("0-1"),
            PinMode::Fan => Some("0-4"),
            PinMode::Pwm | PinMode::OutputAnalog => Some("0-255"),
            _ => None,
        }
    }
}

impl From<&str> for PinMode {
    fn from(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "INPUT_DIGITAL" => PinMode::InputDigital,
            "OUTPUT_DIGITAL" => PinMode::OutputDigital,
            "PWM" => PinMode::Pwm,
            "INPUT_ANALOG" => PinMode::InputAnalog,
            "OUTPUT_ANALOG" => PinMode::OutputAnalog,
            "DHT22_SENSOR" => PinMode::Dht22Sensor,
            "YL_69_SENSOR" => PinMode::Yl69Sensor,
            "DS18B20" => PinMode::Ds18b20,
            "THERMOCOUPLE" => PinMode::Thermocouple,
            "FAN" => PinMode::Fan,
            _ => PinMode::Other(raw.to_string()),
        }
    }
}

impl From<String> for PinMode {
    fn from(raw: String) -> Self {
        PinMode::from(raw.as_str())
    }
}

impl From<PinMode> for String {
    fn from(mode: PinMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for PinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last path segment of a device topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Sensor readings published by the device.
    Value,
    /// Actuator state reported back by the device.
    State,
    /// Actuator commands consumed by the device.
    Set,
}

impl Channel {
    pub const fn suffix(self) -> &'static str {
        match self {
            Channel::Value => "value",
            Channel::State => "state",
            Channel::Set => "set",
        }
    }
}

/// Maps a pin mode to its topic prefix.
///
/// Unknown modes fall back to the lower-cased mode name.
pub fn prefix(mode: &PinMode) -> String {
    match mode {
        PinMode::InputDigital => "digital_input".into(),
        PinMode::OutputDigital => "digital_output".into(),
        PinMode::Pwm => "pwm".into(),
        PinMode::InputAnalog => "analog_input".into(),
        PinMode::OutputAnalog => "analog_output".into(),
        PinMode::Dht22Sensor => "dht22".into(),
        PinMode::Yl69Sensor => "yl69".into(),
        PinMode::Ds18b20 => "ds18b20".into(),
        PinMode::Thermocouple => "thermocouple".into(),
        PinMode::Fan => "fan".into(),
        PinMode::Other(raw) => raw.to_lowercase(),
    }
}

/// Builds `/{client_id}/{prefix}/{name}/{suffix}`. No validation is performed.
pub fn compose_topic(client_id: &str, prefix: &str, name: &str, suffix: &str) -> String {
    format!("/{client_id}/{prefix}/{name}/{suffix}")
}

/// Topic builder bound to the device client id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRouter {
    client_id: String,
}

impl TopicRouter {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }

    pub fn topic(&self, mode: &PinMode, name: &str, channel: Channel) -> String {
        compose_topic(&self.client_id, &prefix(mode), name, channel.suffix())
    }

    /// Topic the harness listens on for a pin, if the device reports anything for it.
    ///
    /// Sensors report on `value`, actuators echo their applied state on `state`.
    pub fn subscribe_topic(&self, mode: &PinMode, name: &str) -> Option<String> {
        if mode.is_sensor() {
            Some(self.topic(mode, name, Channel::Value))
        } else if mode.is_actuator() {
            Some(self.topic(mode, name, Channel::State))
        } else {
            None
        }
    }

    /// Command topic for actuator modes.
    pub fn set_topic(&self, mode: &PinMode, name: &str) -> Option<String> {
        mode.is_actuator().then(|| self.topic(mode, name, Channel::Set))
    }
}
