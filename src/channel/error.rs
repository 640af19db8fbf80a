//! Channel-specific error types.
//!
//! Errors raised while opening or driving a serial line channel, separate
//! from supervisor-level errors to keep the transport layer self-contained.

use thiserror::Error;

/// Errors that can occur while opening or using a line channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The specified serial port was not found on the system.
    #[error("serial port not found: {0}")]
    NotFound(String),

    /// Opening the port failed for a reason other than absence.
    #[error("failed to open port: {0}")]
    Open(String),

    /// An I/O error occurred on the open channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The open attempt exceeded its deadline.
    #[error("connection attempt timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl ChannelError {
    /// Create a NotFound error from a port path.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an Open error from a message.
    pub fn open(message: impl Into<String>) -> Self {
        Self::Open(message.into())
    }

    /// Create a Timeout error from a duration.
    pub fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChannelError::not_found("/dev/ttyUSB0");
        assert_eq!(err.to_string(), "serial port not found: /dev/ttyUSB0");

        let err = ChannelError::open("permission denied");
        assert_eq!(err.to_string(), "failed to open port: permission denied");
    }

    #[test]
    fn test_timeout_error() {
        let err = ChannelError::timeout(std::time::Duration::from_millis(500));
        assert!(err.to_string().contains("500ms"));
    }
}
