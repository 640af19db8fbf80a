//! Connection state machine types and status snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the managed connection.
///
/// Exactly one value holds at any instant; transitions happen only on the
/// supervisor task, and every observer sees the value through the same
/// serialized snapshots, so no partial transition is ever visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    /// No channel and no pending work.
    Disconnected,
    /// An open attempt is in flight.
    Connecting,
    /// A channel is open and ingesting.
    Connected,
    /// A retry timer is armed.
    Reconnecting,
    /// The active channel is being migrated to a better port.
    SwitchingPorts,
    /// The last attempt failed; terminal once retries are exhausted.
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::SwitchingPorts => "switching-ports",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Read-only snapshot of the supervisor, returned by `status()`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub is_connected: bool,
    pub current_port: Option<String>,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    /// Arrival time of the most recent line, or the open time if nothing
    /// has arrived yet on this channel.
    pub last_data_received_at: Option<DateTime<Utc>>,
}
