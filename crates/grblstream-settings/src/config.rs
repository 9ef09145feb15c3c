//! Persisted link configuration
//!
//! Supports JSON and TOML files, chosen by extension. The default file
//! lives in the platform config directory.
//!
//! Configuration is organized into two sections:
//! - Connection settings (port, serial framing, read timeout)
//! - Streaming settings (flow control, pump pacing, status polling)

use crate::error::{ConfigError, ConfigResult, SettingsResult};
use grblstream_communication::{list_ports, ConnectionParams, FlowStrategy, LinkConfig, SerialParity};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Port value that selects the first detected controller port
pub const AUTO_PORT: &str = "Auto";

/// Connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port, or "Auto"
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1-2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Hardware flow control
    pub flow_control: bool,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let params = ConnectionParams::default();
        Self {
            port: AUTO_PORT.to_string(),
            baud_rate: params.baud_rate,
            data_bits: params.data_bits,
            stop_bits: params.stop_bits,
            parity: params.parity,
            flow_control: params.flow_control,
            timeout_ms: params.timeout_ms,
        }
    }
}

/// Streaming settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Pump idle sleep in milliseconds
    pub idle_delay_ms: u64,
    /// Status poll interval in milliseconds, disabled when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_poll_interval_ms: Option<u64>,
    /// Query status and settings after every controller boot
    pub query_on_welcome: bool,
    /// Admission strategy
    pub flow_control: FlowStrategy,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            idle_delay_ms: 10,
            status_poll_interval_ms: None,
            query_on_welcome: false,
            flow_control: FlowStrategy::default(),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Streaming settings
    pub streaming: StreamingSettings,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> ConfigResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(ConfigError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location
    pub fn default_path() -> ConfigResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("grblstream").join("config.toml"))
            .ok_or_else(|| ConfigError::UnsupportedPlatform(std::env::consts::OS.to_string()))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load config from file, or defaults if the file does not exist
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML), creating parent directories
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        tracing::debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        let conn = &self.connection;
        if conn.port.trim().is_empty() {
            return Err(ConfigError::MissingKey("connection.port".to_string()));
        }
        if conn.baud_rate == 0 {
            return Err(ConfigError::out_of_range("connection.baud_rate", conn.baud_rate));
        }
        if !(5..=8).contains(&conn.data_bits) {
            return Err(ConfigError::out_of_range("connection.data_bits", conn.data_bits));
        }
        if !(1..=2).contains(&conn.stop_bits) {
            return Err(ConfigError::out_of_range("connection.stop_bits", conn.stop_bits));
        }
        if conn.timeout_ms == 0 {
            return Err(ConfigError::out_of_range("connection.timeout_ms", conn.timeout_ms));
        }

        let streaming = &self.streaming;
        if let FlowStrategy::ByteBudgeted { capacity } = streaming.flow_control {
            // One byte is always kept free, so a single-byte budget admits nothing
            if capacity < 2 {
                return Err(ConfigError::out_of_range(
                    "streaming.flow_control.capacity",
                    capacity,
                ));
            }
        }
        if streaming.idle_delay_ms == 0 {
            return Err(ConfigError::out_of_range(
                "streaming.idle_delay_ms",
                streaming.idle_delay_ms,
            ));
        }
        if streaming.status_poll_interval_ms == Some(0) {
            return Err(ConfigError::out_of_range("streaming.status_poll_interval_ms", 0));
        }

        Ok(())
    }

    /// Runtime link configuration
    pub fn to_link_config(&self) -> LinkConfig {
        let streaming = &self.streaming;
        LinkConfig {
            flow_control: streaming.flow_control,
            idle_delay: Duration::from_millis(streaming.idle_delay_ms),
            status_poll_interval: streaming.status_poll_interval_ms.map(Duration::from_millis),
            query_on_welcome: streaming.query_on_welcome,
        }
    }

    /// Serial parameters, resolving "Auto" to the first detected controller port
    pub fn to_connection_params(&self) -> SettingsResult<ConnectionParams> {
        let conn = &self.connection;
        let port = if conn.port.eq_ignore_ascii_case(AUTO_PORT) {
            let ports = list_ports().map_err(|e| {
                tracing::warn!("Port discovery failed: {}", e);
                ConfigError::MissingKey("connection.port".to_string())
            })?;
            let first = ports
                .into_iter()
                .next()
                .ok_or_else(|| ConfigError::MissingKey("connection.port".to_string()))?;
            tracing::info!("Auto-selected port {} ({})", first.port_name, first.description);
            first.port_name
        } else {
            conn.port.clone()
        };

        Ok(ConnectionParams {
            port,
            baud_rate: conn.baud_rate,
            data_bits: conn.data_bits,
            stop_bits: conn.stop_bits,
            parity: conn.parity,
            flow_control: conn.flow_control,
            timeout_ms: conn.timeout_ms,
        })
    }
}
