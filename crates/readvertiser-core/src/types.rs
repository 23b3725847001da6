//! Data model shared by the reconciler and tunnel backends
//!
//! These types are the reconciler's view of a WireGuard device. Backends
//! convert to and from them; the reconciler never touches backend types.
//!
//! Everything except a peer's endpoint is pass-through data: it is read from
//! the device and written back exactly as read.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Length of a WireGuard key in bytes
pub const KEY_LEN: usize = 32;

/// A 32-byte WireGuard key (public, private or preshared)
///
/// The reconciler only ever compares keys for equality; it never does
/// cryptography with them.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key([u8; KEY_LEN]);

/// The public key identifying a peer
pub type PeerKey = Key;

impl Key {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Decode a standard base64 key
    ///
    /// Fails unless the input decodes to exactly [`KEY_LEN`] bytes.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::invalid_key(format!("not valid base64: {}", e)))?;

        let bytes: [u8; KEY_LEN] = decoded.as_slice().try_into().map_err(|_| {
            Error::invalid_key(format!(
                "key length is {} bytes, expected {}",
                decoded.len(),
                KEY_LEN
            ))
        })?;

        Ok(Self(bytes))
    }

    /// Encode as standard base64
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.to_base64())
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_base64(s)
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// One allowed-IP range of a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllowedIp {
    /// Network address
    pub address: IpAddr,
    /// Prefix length
    pub cidr: u8,
}

impl AllowedIp {
    pub fn new(address: IpAddr, cidr: u8) -> Self {
        Self { address, cidr }
    }
}

/// The tunnel subsystem's view of one peer
#[derive(Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// Peer identity
    pub public_key: PeerKey,
    /// Where packets for this peer are sent. The only field readvertiser changes.
    pub endpoint: Option<SocketAddr>,
    /// Optional preshared key (pass-through)
    pub preshared_key: Option<Key>,
    /// Keepalive interval in seconds (pass-through)
    pub persistent_keepalive_interval: Option<u16>,
    /// Allowed-IP ranges (pass-through)
    pub allowed_ips: Vec<AllowedIp>,
}

impl PeerRecord {
    /// A peer with the given key and endpoint and no other settings
    pub fn new(public_key: PeerKey, endpoint: Option<SocketAddr>) -> Self {
        Self {
            public_key,
            endpoint,
            preshared_key: None,
            persistent_keepalive_interval: None,
            allowed_ips: Vec::new(),
        }
    }
}

// Preshared keys are secrets; keep them out of logs
impl fmt::Debug for PeerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerRecord")
            .field("public_key", &self.public_key)
            .field("endpoint", &self.endpoint)
            .field(
                "preshared_key",
                &self.preshared_key.map(|_| "<REDACTED>"),
            )
            .field(
                "persistent_keepalive_interval",
                &self.persistent_keepalive_interval,
            )
            .field("allowed_ips", &self.allowed_ips)
            .finish()
    }
}

/// The tunnel subsystem's view of one local interface
///
/// Read fresh on every tick and discarded once the tick's decision is made.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceState {
    /// Interface name
    pub name: String,
    /// Device private key (pass-through)
    pub private_key: Option<Key>,
    /// UDP listen port (pass-through)
    pub listen_port: Option<u16>,
    /// Firewall mark (pass-through)
    pub fwmark: Option<u32>,
    /// Peers in the order the subsystem reported them
    pub peers: Vec<PeerRecord>,
}

impl DeviceState {
    /// Find the peer with the given public key
    pub fn find_peer(&self, key: &PeerKey) -> Option<&PeerRecord> {
        self.peers.iter().find(|peer| peer.public_key == *key)
    }
}

impl fmt::Debug for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceState")
            .field("name", &self.name)
            .field("private_key", &self.private_key.map(|_| "<REDACTED>"))
            .field("listen_port", &self.listen_port)
            .field("fwmark", &self.fwmark)
            .field("peers", &self.peers)
            .finish()
    }
}

/// A complete configuration write for one device
///
/// Backends must submit every peer in `peers`. With `replace_peers` unset the
/// subsystem merges the list into the existing peer set, so no peer can be
/// dropped even if the device changed between read and write.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Private key, resupplied from the read state
    pub private_key: Option<Key>,
    /// Listen port, resupplied from the read state
    pub listen_port: Option<u16>,
    /// Firewall mark, resupplied from the read state
    pub fwmark: Option<u32>,
    /// Whether the subsystem should drop peers missing from `peers`
    pub replace_peers: bool,
    /// Every peer of the device
    pub peers: Vec<PeerRecord>,
}

impl DeviceConfig {
    /// Build the write that moves one peer's endpoint to `new_ip`
    ///
    /// Every peer of `state` is copied verbatim. The peer matching `key`
    /// keeps its port; only the address changes.
    pub fn with_peer_endpoint(state: &DeviceState, key: &PeerKey, new_ip: IpAddr) -> Result<Self> {
        let target = state
            .find_peer(key)
            .ok_or_else(|| Error::peer_not_found(&state.name, key))?;
        if target.endpoint.is_none() {
            return Err(Error::missing_endpoint(&state.name, key));
        }

        let peers = state
            .peers
            .iter()
            .map(|peer| {
                let mut peer = peer.clone();
                if peer.public_key == *key
                    && let Some(endpoint) = peer.endpoint.as_mut()
                {
                    endpoint.set_ip(new_ip);
                }
                peer
            })
            .collect();

        Ok(Self {
            private_key: state.private_key,
            listen_port: state.listen_port,
            fwmark: state.fwmark,
            replace_peers: false,
            peers,
        })
    }
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("private_key", &self.private_key.map(|_| "<REDACTED>"))
            .field("listen_port", &self.listen_port)
            .field("fwmark", &self.fwmark)
            .field("replace_peers", &self.replace_peers)
            .field("peers", &self.peers)
            .finish()
    }
}

/// Whether `address` is one of `candidates`
///
/// IPv4-mapped IPv6 addresses compare equal to their IPv4 form.
pub fn contains_address(candidates: &[IpAddr], address: IpAddr) -> bool {
    let address = address.to_canonical();
    candidates
        .iter()
        .any(|candidate| candidate.to_canonical() == address)
}
