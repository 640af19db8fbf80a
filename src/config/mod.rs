//! Configuration module for sensor-bridge.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SENSOR_BRIDGE_CONFIG` environment variable (explicit path)
//! 2. `./sensor-bridge.toml` (current directory)
//! 3. The platform config directory (e.g. `~/.config/sensor-bridge/`)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Scalar values can be overridden via environment variables following the
//! pattern `SENSOR_BRIDGE_<SECTION>_<KEY>`:
//!
//! - `SENSOR_BRIDGE_CONNECTION_PORT_PATH=/dev/ttyUSB1`
//! - `SENSOR_BRIDGE_CONNECTION_BAUD_RATE=115200`
//! - `SENSOR_BRIDGE_STORAGE_DATABASE_PATH=/var/lib/sensor-bridge.db`

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{get_default_config_dir, resolve_config_path, ConfigLoader};
pub use schema::{
    Config, ConnectionConfig, DataType, LoggingConfig, StorageConfig, DEFAULT_BAUD_RATE,
    DEFAULT_CONNECTION_TIMEOUT_MS, DEFAULT_CSV_DELIMITER, DEFAULT_LINE_DELIMITER,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_PORT_SCAN_INTERVAL_MS, DEFAULT_RECONNECT_DELAY_MS,
    DEFAULT_STALE_DATA_TIMEOUT_MS,
};
