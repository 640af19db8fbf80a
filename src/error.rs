//! Unified application error type.
//!
//! Area-specific errors (discovery, channel, pipeline, persistence) stay in
//! their own modules; this type is what the public supervisor surface
//! returns, with `From` conversions so `?` works across tiers.

use crate::channel::ChannelError;
use crate::config::ConfigError;
use crate::discovery::DiscoveryError;
use crate::persistence::PersistenceError;
use thiserror::Error;

/// Errors returned by the public supervisor API.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A write or read was attempted with no open channel.
    #[error("not connected")]
    NotConnected,

    /// The supervisor was closed; no further commands are accepted.
    #[error("connection manager is closed")]
    SupervisorGone,

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
