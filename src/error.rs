//! Error types for the tunnel forwarder.

use std::io;

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the tunnel forwarder.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors on the device or the transport
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Data frame payload exceeds the device buffer capacity
    #[error("Frame too large: {len} bytes (max {max})")]
    OversizeFrame { len: usize, max: usize },

    /// Transport connection is broken on the write side
    #[error("Transport connection broken")]
    TransportBroken,

    /// TUN/TAP device error
    #[error("Device error: {0}")]
    Device(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A pump task panicked or was aborted unexpectedly
    #[error("Pump task failed: {0}")]
    TaskFailed(String),
}

impl Error {
    /// Create a new device error.
    pub fn device<S: Into<String>>(msg: S) -> Self {
        Self::Device(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Map a transport write failure, folding broken-pipe style errors
    /// into [`Error::TransportBroken`].
    pub fn from_transport_write(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected => Self::TransportBroken,
            _ => Self::Io(err),
        }
    }

    /// Check whether this error means the transport can no longer be written.
    pub fn is_broken_transport(&self) -> bool {
        matches!(self, Self::TransportBroken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broken_pipe_maps_to_transport_broken() {
        let err = Error::from_transport_write(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.is_broken_transport());

        let err = Error::from_transport_write(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(err.is_broken_transport());
    }

    #[test]
    fn test_other_write_errors_stay_io() {
        let err = Error::from_transport_write(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_broken_transport());
    }

    #[test]
    fn test_oversize_display() {
        let err = Error::OversizeFrame { len: 2001, max: 2000 };
        assert_eq!(err.to_string(), "Frame too large: 2001 bytes (max 2000)");
    }
}
