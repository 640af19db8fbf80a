//! Sensor Bridge Library
//!
//! Core functionality for the serial sensor telemetry bridge: port
//! discovery and scoring, supervised line channels with bounded
//! reconnection and hot port switching, line parsing and validation, and
//! persistence of validated records.
//!
//! # Modules
//!
//! - `config`: Configuration management with TOML support
//! - `discovery`: Port enumeration and sensor-device scoring
//! - `channel`: Framed line channel over one open serial port
//! - `supervisor`: Connection state machine, reconnection, port scanning
//! - `pipeline`: Line parsing, validation, and record forwarding
//! - `persistence`: Record sink trait and the SQLite gateway
//! - `events`: Outbound event stream for UI/notification consumers
//! - `error`: Unified error handling

pub mod channel;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod persistence;
pub mod pipeline;
pub mod supervisor;

// Re-export commonly used types for convenience
pub use channel::{ChannelError, ChannelFactory, MockChannelFactory, SerialChannelFactory};
pub use config::{Config, ConfigError, ConfigLoader, ConnectionConfig, DataType};
pub use discovery::{DiscoveryError, PortCandidate, PortDiscovery, SystemPortDiscovery};
pub use error::BridgeError;
pub use events::{BroadcastNotifier, Event, EventSink, ReconnectPhase};
pub use persistence::{PersistenceError, PersistenceGateway, SaveReceipt, SqliteGateway};
pub use pipeline::{IncomingRecord, IngestionPipeline, ProtocolError, ValidationError};
pub use supervisor::{ConnectionState, ConnectionStatus, ConnectionSupervisor};
