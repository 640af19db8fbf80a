//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial link and ingestion configuration
    pub connection: ConnectionConfig,
    /// Local storage configuration
    pub storage: StorageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Line parsing mode for incoming telemetry.
///
/// Unrecognized values deserialize to [`DataType::Unsupported`]; every line
/// processed under that mode is rejected with a protocol error instead of
/// failing at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataType {
    /// Each line is a JSON object; the object is the record.
    JsonObject,
    /// Each line is a JSON array zipped positionally into `field_mapping`.
    JsonArray,
    /// Each line is `csv_delimiter`-separated values zipped into `field_mapping`.
    Csv,
    /// Each line is kept verbatim under a `raw_data` field.
    Raw,
    /// Catch-all for unknown mode strings.
    #[serde(other)]
    Unsupported,
}

impl Default for DataType {
    fn default() -> Self {
        Self::JsonObject
    }
}

/// Serial connection and ingestion settings.
///
/// Immutable after construction; file values are merged over the defaults
/// below, and CLI flags are merged over the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Fixed port path. `None` means auto-detect via discovery.
    pub port_path: Option<String>,
    /// Link speed in bits per second.
    pub baud_rate: u32,
    /// Line parsing mode.
    pub data_type: DataType,
    /// Byte sequence marking the end of one telemetry message.
    pub line_delimiter: String,
    /// Field separator for `csv` mode.
    pub csv_delimiter: String,
    /// Positional field names for `json-array` and `csv` modes.
    pub field_mapping: Vec<String>,
    /// Persistence target table. `None` disables persistence.
    pub db_table_name: Option<String>,
    /// Fields that must be present and non-empty after parsing.
    pub required_fields: Vec<String>,
    /// Field names forwarded to the persistence gateway as an
    /// encrypt-at-rest hint. The pipeline never encrypts.
    pub fields_to_encrypt: Vec<String>,
    /// Enable bounded automatic reconnection.
    pub auto_reconnect: bool,
    /// Fixed delay between scheduled reconnect attempts.
    pub reconnect_delay_ms: u64,
    /// Retry ceiling per failure episode.
    pub max_reconnect_attempts: u32,
    /// Deadline for a single open attempt.
    pub connection_timeout_ms: u64,
    /// Period of the live port rescan while connected.
    pub port_scan_interval_ms: u64,
    /// Allow hot migration to a better-scoring port.
    pub enable_dynamic_port_switching: bool,
    /// Silence threshold before a stale-data warning is emitted.
    pub stale_data_timeout_ms: u64,
}

// Default configuration constants
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_LINE_DELIMITER: &str = "\r\n";
pub const DEFAULT_CSV_DELIMITER: &str = ",";
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_PORT_SCAN_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_STALE_DATA_TIMEOUT_MS: u64 = 30_000;

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port_path: None,
            baud_rate: DEFAULT_BAUD_RATE,
            data_type: DataType::default(),
            line_delimiter: DEFAULT_LINE_DELIMITER.to_string(),
            csv_delimiter: DEFAULT_CSV_DELIMITER.to_string(),
            field_mapping: Vec::new(),
            db_table_name: None,
            required_fields: Vec::new(),
            fields_to_encrypt: Vec::new(),
            auto_reconnect: true,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            port_scan_interval_ms: DEFAULT_PORT_SCAN_INTERVAL_MS,
            enable_dynamic_port_switching: false,
            stale_data_timeout_ms: DEFAULT_STALE_DATA_TIMEOUT_MS,
        }
    }
}

impl ConnectionConfig {
    /// Fixed inter-attempt reconnect delay as a Duration.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Open-attempt deadline as a Duration.
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Live rescan period as a Duration.
    pub fn port_scan_interval(&self) -> Duration {
        Duration::from_millis(self.port_scan_interval_ms)
    }

    /// Stale-data silence threshold as a Duration.
    pub fn stale_data_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_data_timeout_ms)
    }
}

/// Local storage configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("sensor-bridge.db"),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
