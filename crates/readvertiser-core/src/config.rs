//! Configuration types for the readvertiser system
//!
//! The configuration is built once at startup and is immutable afterwards.
//! The reconciler receives it by value; nothing reads process-wide globals.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::PeerKey;

/// Main reconciler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// WireGuard interface name (e.g., "wg0")
    pub device: String,

    /// Public key of the peer whose endpoint is kept in sync
    pub peer_key: PeerKey,

    /// Host part of the peer's configured endpoint
    pub endpoint_host: EndpointHost,

    /// Seconds between reconciliation ticks
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Capacity of the reconciler event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ReconcilerConfig {
    /// Create a configuration with default interval and channel capacity
    pub fn new(device: impl Into<String>, peer_key: PeerKey, endpoint_host: EndpointHost) -> Self {
        Self {
            device: device.into(),
            peer_key,
            endpoint_host,
            interval_secs: default_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Set the poll interval in seconds
    pub fn with_interval_secs(mut self, interval_secs: u64) -> Self {
        self.interval_secs = interval_secs;
        self
    }

    /// Set the event channel capacity
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Poll interval as a duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.device.is_empty() {
            return Err(Error::config("WireGuard device name cannot be empty"));
        }
        if self.interval_secs == 0 {
            return Err(Error::config("Refresh interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config("Event channel capacity must be > 0"));
        }
        if let EndpointHost::Name(name) = &self.endpoint_host
            && name.is_empty()
        {
            return Err(Error::config("Endpoint DNS name cannot be empty"));
        }
        Ok(())
    }
}

/// Host part of a peer endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EndpointHost {
    /// A literal address: nothing to resolve, the reconciler idles
    Address(IpAddr),
    /// A DNS name tracked by the reconciler
    Name(String),
}

impl EndpointHost {
    /// Classify a host string
    ///
    /// Literal IPv4 and IPv6 addresses (bracketed or not) become
    /// [`EndpointHost::Address`]; anything else is a DNS name.
    pub fn parse(host: &str) -> Self {
        let host = host.trim();
        let unbracketed = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        match unbracketed.parse::<IpAddr>() {
            Ok(ip) => EndpointHost::Address(ip),
            Err(_) => EndpointHost::Name(host.to_string()),
        }
    }

    /// The DNS name, if this host is one
    pub fn dns_name(&self) -> Option<&str> {
        match self {
            EndpointHost::Name(name) => Some(name),
            EndpointHost::Address(_) => None,
        }
    }
}

impl fmt::Display for EndpointHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointHost::Address(ip) => write!(f, "{}", ip),
            EndpointHost::Name(name) => f.write_str(name),
        }
    }
}

/// Split a `host:port` endpoint into its host and port
///
/// IPv6 hosts must be bracketed (`[fd00::1]:51820`); the brackets are
/// stripped from the returned host.
pub fn split_endpoint(endpoint: &str) -> Result<(String, u16)> {
    let endpoint = endpoint.trim();
    let invalid = |reason: &str| Error::config(format!("Error reading endpoint {}: {}", endpoint, reason));

    let (host, port) = if let Some(rest) = endpoint.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| invalid("missing ']' in address"))?;
        let port = after
            .strip_prefix(':')
            .ok_or_else(|| invalid("missing port in address"))?;
        (host, port)
    } else {
        let (host, port) = endpoint
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port in address"))?;
        if host.contains(':') {
            return Err(invalid("too many colons in address"));
        }
        (host, port)
    };

    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    let port = port
        .parse::<u16>()
        .map_err(|_| invalid("invalid port"))?;

    Ok((host.to_string(), port))
}

fn default_interval_secs() -> u64 {
    60
}

fn default_event_channel_capacity() -> usize {
    100
}
