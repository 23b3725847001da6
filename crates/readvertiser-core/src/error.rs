//! Error types for the readvertiser system
//!
//! This module defines all error types used throughout the crate.
//!
//! Errors fall into two groups:
//! - **Startup-fatal**: [`Error::Config`], [`Error::InvalidKey`], [`Error::Io`].
//!   These reach the process boundary and stop the daemon before the loop starts.
//! - **Tick-recoverable**: everything the reconciler can hit while polling.
//!   These are logged and the next tick runs on schedule.

use thiserror::Error;

/// Result type alias for readvertiser operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the readvertiser system
#[derive(Error, Debug)]
pub enum Error {
    /// DNS lookup failed
    #[error("Unable to look up dns name {name}: {message}")]
    Resolution {
        /// The name that was looked up
        name: String,
        /// Underlying cause
        message: String,
    },

    /// DNS lookup succeeded but returned nothing usable
    #[error("DNS name {0} resolved to no addresses")]
    NoAddresses(String),

    /// The tunnel device could not be read
    #[error("Unable to get wireguard device {device}: {message}")]
    DeviceUnavailable {
        /// Interface name
        device: String,
        /// Underlying cause
        message: String,
    },

    /// No peer on the device carries the configured public key
    #[error("Peer {peer} not found on wireguard device {device}")]
    PeerNotFound {
        /// Interface name
        device: String,
        /// Base64 public key of the missing peer
        peer: String,
    },

    /// The target peer exists but has no endpoint, so there is no port to keep
    #[error("Peer {peer} on wireguard device {device} has no endpoint configured")]
    MissingEndpoint {
        /// Interface name
        device: String,
        /// Base64 public key of the peer
        peer: String,
    },

    /// The tunnel subsystem rejected a configuration write
    #[error("Unable to configure wireguard device {device}: {message}")]
    Reconfigure {
        /// Interface name
        device: String,
        /// Underlying cause
        message: String,
    },

    /// A key did not decode to exactly 32 bytes of base64
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors (configuration file access)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a resolution error
    pub fn resolution(name: impl Into<String>, message: impl ToString) -> Self {
        Self::Resolution {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Create a device-unavailable error
    pub fn device_unavailable(device: impl Into<String>, message: impl ToString) -> Self {
        Self::DeviceUnavailable {
            device: device.into(),
            message: message.to_string(),
        }
    }

    /// Create a "peer not found" error
    pub fn peer_not_found(device: impl Into<String>, peer: impl ToString) -> Self {
        Self::PeerNotFound {
            device: device.into(),
            peer: peer.to_string(),
        }
    }

    /// Create a missing-endpoint error
    pub fn missing_endpoint(device: impl Into<String>, peer: impl ToString) -> Self {
        Self::MissingEndpoint {
            device: device.into(),
            peer: peer.to_string(),
        }
    }

    /// Create a reconfiguration error
    pub fn reconfigure(device: impl Into<String>, message: impl ToString) -> Self {
        Self::Reconfigure {
            device: device.into(),
            message: message.to_string(),
        }
    }

    /// Create an invalid key error
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the reconciler may swallow this error and carry on with the next tick
    pub fn is_tick_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Resolution { .. }
                | Self::NoAddresses(_)
                | Self::DeviceUnavailable { .. }
                | Self::PeerNotFound { .. }
                | Self::MissingEndpoint { .. }
                | Self::Reconfigure { .. }
                | Self::Other(_)
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
