//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file may name only the fields it wants to change.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "device": { "port": "/dev/ttyUSB0" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodelightSettings {
    /// HTTP / WebSocket listener.
    pub server: ServerSettings,
    /// Device bridge selection and serial parameters.
    pub device: DeviceSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl NodelightSettings {
    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.server.client_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.clientQueueCapacity must be greater than 0".into(),
            ));
        }
        if self.server.hub_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.hubQueueCapacity must be greater than 0".into(),
            ));
        }
        if !self.server.ws_path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "server.wsPath must start with '/': {}",
                self.server.ws_path
            )));
        }
        if self.device.read_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "device.readTimeoutMs must be greater than 0".into(),
            ));
        }
        if self.device.read_chunk_bytes == 0 {
            return Err(SettingsError::InvalidValue(
                "device.readChunkBytes must be greater than 0".into(),
            ));
        }
        if self.device.backoff_initial_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "device.backoffInitialMs must be greater than 0".into(),
            ));
        }
        if self.device.backoff_initial_ms > self.device.backoff_max_ms {
            return Err(SettingsError::InvalidValue(
                "device.backoffInitialMs must not exceed device.backoffMaxMs".into(),
            ));
        }
        Ok(())
    }
}

/// Listener and client queue settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` for auto-assign).
    pub port: u16,
    /// Path of the WebSocket endpoint.
    pub ws_path: String,
    /// Directory served for every non-API path.
    pub static_dir: String,
    /// Outbound frames buffered per client before it is dropped.
    pub client_queue_capacity: usize,
    /// Pending broadcasts buffered by the hub before new ones are dropped.
    pub hub_queue_capacity: usize,
    /// Interval between WebSocket pings.
    pub ping_interval_secs: u64,
}

impl ServerSettings {
    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            ws_path: "/ws".to_string(),
            static_dir: "../public".to_string(),
            client_queue_capacity: 256,
            hub_queue_capacity: 256,
            ping_interval_secs: 30,
        }
    }
}

/// Device variant selection and serial line parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceSettings {
    /// Serial address (e.g. `/dev/ttyUSB0`, `COM3`). Enables the real bridge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Use the software spoofer when no serial address is set.
    pub spoof: bool,
    /// Serial baud rate.
    pub baud_rate: u32,
    /// Per-read timeout in milliseconds.
    pub read_timeout_ms: u64,
    /// Bytes requested per read call.
    pub read_chunk_bytes: usize,
    /// Longest partial line kept before it is flushed as an opaque frame.
    pub max_line_bytes: usize,
    /// First retry delay after a read error.
    pub backoff_initial_ms: u64,
    /// Ceiling for the retry delay.
    pub backoff_max_ms: u64,
}

impl DeviceSettings {
    /// Which variant these settings select.
    pub fn mode(&self) -> DeviceMode {
        match self.port.as_deref() {
            Some(port) if !port.is_empty() => DeviceMode::Serial(port.to_string()),
            _ if self.spoof => DeviceMode::Spoof,
            _ => DeviceMode::None,
        }
    }

    /// Per-read timeout.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            port: None,
            spoof: false,
            baud_rate: 9600,
            read_timeout_ms: 1000,
            read_chunk_bytes: 128,
            max_line_bytes: 4096,
            backoff_initial_ms: 100,
            backoff_max_ms: 5000,
        }
    }
}

/// The device variant selected by configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceMode {
    /// Real bridge on the given serial address.
    Serial(String),
    /// Software spoofer.
    Spoof,
    /// No device; device-directed frames are ignored.
    None,
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
