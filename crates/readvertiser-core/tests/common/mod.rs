//! Test doubles and common utilities for reconciler contract tests
//!
//! The doubles record every call so tests can assert on what the reconciler
//! did, not just on what it returned.

use readvertiser_core::config::{EndpointHost, ReconcilerConfig};
use readvertiser_core::error::{Error, Result};
use readvertiser_core::traits::{Resolver, TunnelControl};
use readvertiser_core::types::{AllowedIp, DeviceConfig, DeviceState, KEY_LEN, Key, PeerRecord};
use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// The DNS name every test tracks
pub const TRACKED_NAME: &str = "vpn.example.com";

/// The device every test reconciles
pub const DEVICE: &str = "wg0";

/// A resolver that replays scripted answers
///
/// Answers are consumed in order; once the script runs out the last answer
/// is repeated.
pub struct ScriptedResolver {
    script: Arc<Mutex<VecDeque<Result<Vec<IpAddr>>>>>,
    last: Arc<Mutex<Option<Vec<IpAddr>>>>,
    resolve_call_count: Arc<AtomicUsize>,
    names: Arc<Mutex<Vec<String>>>,
}

// Each contract test uses its own subset of the helpers
#[allow(dead_code)]
impl ScriptedResolver {
    /// A resolver that always answers with `addresses`
    pub fn always(addresses: Vec<IpAddr>) -> Self {
        Self::scripted(vec![Ok(addresses)])
    }

    /// A resolver that plays back `script`
    pub fn scripted(script: Vec<Result<Vec<IpAddr>>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            last: Arc::new(Mutex::new(None)),
            resolve_call_count: Arc::new(AtomicUsize::new(0)),
            names: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get the number of times resolve() was called
    pub fn resolve_call_count(&self) -> usize {
        self.resolve_call_count.load(Ordering::SeqCst)
    }

    /// Names passed to resolve(), in call order
    pub fn resolved_names(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }

    /// Create a new ScriptedResolver that shares its script and counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            script: Arc::clone(&other.script),
            last: Arc::clone(&other.last),
            resolve_call_count: Arc::clone(&other.resolve_call_count),
            names: Arc::clone(&other.names),
        }
    }
}

#[async_trait::async_trait]
impl Resolver for ScriptedResolver {
    async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>> {
        self.resolve_call_count.fetch_add(1, Ordering::SeqCst);
        self.names.lock().unwrap().push(name.to_string());

        match self.script.lock().unwrap().pop_front() {
            Some(Ok(addresses)) => {
                *self.last.lock().unwrap() = Some(addresses.clone());
                Ok(addresses)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| Error::resolution(name, "script exhausted")),
        }
    }
}

/// An in-memory tunnel device that behaves like the kernel in merge mode
///
/// Writes are recorded verbatim and then applied: peers in the write replace
/// peers with the same key, unknown peers are added, and with
/// `replace_peers` set any peer missing from the write is dropped.
pub struct MemoryTunnel {
    state: Arc<Mutex<Option<DeviceState>>>,
    writes: Arc<Mutex<Vec<DeviceConfig>>>,
    get_call_count: Arc<AtomicUsize>,
    reject_writes: Arc<Mutex<VecDeque<String>>>,
}

#[allow(dead_code)]
impl MemoryTunnel {
    /// A tunnel exposing `state`
    pub fn new(state: DeviceState) -> Self {
        Self {
            state: Arc::new(Mutex::new(Some(state))),
            writes: Arc::new(Mutex::new(Vec::new())),
            get_call_count: Arc::new(AtomicUsize::new(0)),
            reject_writes: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// A tunnel whose device does not exist
    pub fn missing() -> Self {
        let tunnel = Self::new(sample_device(endpoint("203.0.113.7:51820")));
        *tunnel.state.lock().unwrap() = None;
        tunnel
    }

    /// Replace the device state (simulates an external tool)
    pub fn set_state(&self, state: Option<DeviceState>) {
        *self.state.lock().unwrap() = state;
    }

    /// Current device state
    pub fn state(&self) -> Option<DeviceState> {
        self.state.lock().unwrap().clone()
    }

    /// Reject the next configure_device() call with `message`
    pub fn reject_next_write(&self, message: &str) {
        self.reject_writes
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    /// Every accepted write, in order
    pub fn writes(&self) -> Vec<DeviceConfig> {
        self.writes.lock().unwrap().clone()
    }

    /// Get the number of accepted writes
    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    /// Get the number of times get_device() was called
    pub fn get_call_count(&self) -> usize {
        self.get_call_count.load(Ordering::SeqCst)
    }

    /// Create a new MemoryTunnel that shares its device and counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            state: Arc::clone(&other.state),
            writes: Arc::clone(&other.writes),
            get_call_count: Arc::clone(&other.get_call_count),
            reject_writes: Arc::clone(&other.reject_writes),
        }
    }
}

#[async_trait::async_trait]
impl TunnelControl for MemoryTunnel {
    async fn get_device(&self, device: &str) -> Result<DeviceState> {
        self.get_call_count.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .clone()
            .filter(|state| state.name == device)
            .ok_or_else(|| Error::device_unavailable(device, "No such device"))
    }

    async fn configure_device(&self, device: &str, config: DeviceConfig) -> Result<()> {
        if let Some(message) = self.reject_writes.lock().unwrap().pop_front() {
            return Err(Error::reconfigure(device, message));
        }

        let mut guard = self.state.lock().unwrap();
        let state = guard
            .as_mut()
            .ok_or_else(|| Error::reconfigure(device, "No such device"))?;

        if config.replace_peers {
            state.peers.clear();
        }
        for peer in &config.peers {
            match state
                .peers
                .iter_mut()
                .find(|existing| existing.public_key == peer.public_key)
            {
                Some(existing) => *existing = peer.clone(),
                None => state.peers.push(peer.clone()),
            }
        }
        state.private_key = config.private_key;
        state.listen_port = config.listen_port;
        state.fwmark = config.fwmark;

        self.writes.lock().unwrap().push(config);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// A deterministic key whose 32 bytes are all `byte`
pub fn key(byte: u8) -> Key {
    Key::from_bytes([byte; KEY_LEN])
}

/// The public key of the tracked peer
pub fn target_key() -> Key {
    key(2)
}

/// Parse a socket address
pub fn endpoint(s: &str) -> SocketAddr {
    s.parse().expect("valid socket address")
}

/// Parse an IP address
pub fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid ip address")
}

/// A device with three peers; the tracked peer sits in the middle at `target_endpoint`
pub fn sample_device(target_endpoint: SocketAddr) -> DeviceState {
    let mut before = PeerRecord::new(key(1), Some(endpoint("198.51.100.1:51820")));
    before.preshared_key = Some(key(9));
    before.persistent_keepalive_interval = Some(25);
    before.allowed_ips = vec![
        AllowedIp::new(ip("10.0.0.0"), 24),
        AllowedIp::new(ip("fd00:1::"), 64),
    ];

    let mut target = PeerRecord::new(target_key(), Some(target_endpoint));
    target.preshared_key = Some(key(8));
    target.persistent_keepalive_interval = Some(15);
    target.allowed_ips = vec![AllowedIp::new(ip("10.1.0.0"), 16)];

    let mut after = PeerRecord::new(key(3), None);
    after.allowed_ips = vec![AllowedIp::new(ip("10.2.0.0"), 16)];

    DeviceState {
        name: DEVICE.to_string(),
        private_key: Some(key(7)),
        listen_port: Some(51820),
        fwmark: Some(0x5157),
        peers: vec![before, target, after],
    }
}

/// Configuration tracking [`TRACKED_NAME`] for the target peer
pub fn tracking_config() -> ReconcilerConfig {
    ReconcilerConfig::new(
        DEVICE,
        target_key(),
        EndpointHost::Name(TRACKED_NAME.to_string()),
    )
}
