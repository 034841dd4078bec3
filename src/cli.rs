use clap::{Parser, ValueEnum};
use log::LevelFilter;
use std::{path::PathBuf, time::Duration};

use crate::coordinator::SessionSettings;

/// mqtt-harness: keeps an IoT device's actuators alive and lets you override them
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Pin topology file (default: ../iot-device/data/pin_config.json)
    #[arg(short = 'p', long = "pin-config")]
    pub pin_config: Option<PathBuf>,

    /// Broker settings file (default: ../iot-device/data/mqtt_config.json)
    #[arg(short = 'm', long = "mqtt-config")]
    pub mqtt_config: Option<PathBuf>,

    /// Override the broker host from the settings file
    #[arg(long)]
    pub host: Option<String>,

    /// Override the broker port from the settings file
    #[arg(long)]
    pub port: Option<u16>,

    /// Auto-publisher scan period in milliseconds
    #[arg(
        long = "tick-ms",
        default_value_t = 100,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub tick_ms: u64,

    /// Seconds to wait for the broker to accept the connection
    #[arg(
        long = "connect-timeout",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub connect_timeout: u64,

    /// Syslog verbosity
    #[arg(long = "log-level", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
}

impl Cli {
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            tick: Duration::from_millis(self.tick_ms),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            ..SessionSettings::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => Self::Off,
            LogLevel::Error => Self::Error,
            LogLevel::Warn => Self::Warn,
            LogLevel::Info => Self::Info,
            LogLevel::Debug => Self::Debug,
            LogLevel::Trace => Self::Trace,
        }
    }
}
