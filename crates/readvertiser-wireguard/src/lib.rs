// # WireGuard Tunnel Control
//
// This crate provides the TunnelControl backend for real WireGuard devices,
// built on the `wireguard-control` crate.
//
// ## Backends
//
// - **Kernel** (Linux only): generic netlink, the same channel `wg` uses
// - **Userspace**: the UAPI socket under /var/run/wireguard, as exposed by
//   wireguard-go, boringtun and friends
//
// ## Write Semantics
//
// A write is one `DeviceUpdate` carrying:
// - private key, listen port and fwmark exactly as read
// - one peer entry per peer in the `DeviceConfig`, every field copied
// - `replace_peers` only if the DeviceConfig asks for it (readvertiser never does)
//
// Allowed IPs are never replaced: the kernel merges the resubmitted ranges
// into the identical existing ones.
//
// `wireguard-control` has no per-peer update-only flag, so every peer in the
// write is upserted. A peer removed by another tool between `get_device` and
// `configure_device` is added back by that write.
//
// ## Threading
//
// `wireguard-control` is blocking; every call runs on tokio's blocking pool.

use async_trait::async_trait;
use readvertiser_core::traits::TunnelControl;
use readvertiser_core::types::{AllowedIp, DeviceConfig, DeviceState, Key, PeerRecord};
use readvertiser_core::{Error, Result};
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use wireguard_control::{
    Backend, Device, DeviceUpdate, InterfaceName, Key as WgKey, PeerConfig, PeerConfigBuilder,
};

/// Which WireGuard implementation to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WgBackend {
    /// In-kernel WireGuard via netlink
    #[cfg(target_os = "linux")]
    Kernel,
    /// Userspace implementation via its UAPI socket
    Userspace,
}

impl WgBackend {
    /// Backend name as accepted by [`WgBackend::from_str`]
    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(target_os = "linux")]
            WgBackend::Kernel => "kernel",
            WgBackend::Userspace => "userspace",
        }
    }

    fn as_wireguard(self) -> Backend {
        match self {
            #[cfg(target_os = "linux")]
            WgBackend::Kernel => Backend::Kernel,
            WgBackend::Userspace => Backend::Userspace,
        }
    }
}

impl Default for WgBackend {
    #[cfg(target_os = "linux")]
    fn default() -> Self {
        WgBackend::Kernel
    }

    #[cfg(not(target_os = "linux"))]
    fn default() -> Self {
        WgBackend::Userspace
    }
}

impl FromStr for WgBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            #[cfg(target_os = "linux")]
            "kernel" => Ok(WgBackend::Kernel),
            #[cfg(not(target_os = "linux"))]
            "kernel" => Err(Error::config(
                "Kernel WireGuard backend is only supported on Linux",
            )),
            "userspace" => Ok(WgBackend::Userspace),
            other => Err(Error::config(format!(
                "Unknown WireGuard backend '{}'. Supported backends: kernel, userspace",
                other
            ))),
        }
    }
}

impl fmt::Display for WgBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// TunnelControl backed by a real WireGuard implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct WireguardControl {
    backend: WgBackend,
}

impl WireguardControl {
    pub fn new(backend: WgBackend) -> Self {
        Self { backend }
    }

    /// The backend this control talks to
    pub fn backend(&self) -> WgBackend {
        self.backend
    }
}

#[async_trait]
impl TunnelControl for WireguardControl {
    async fn get_device(&self, device: &str) -> Result<DeviceState> {
        let iface = interface_name(device)
            .map_err(|message| Error::device_unavailable(device, message))?;
        let backend = self.backend.as_wireguard();

        let wg_device = tokio::task::spawn_blocking(move || Device::get(&iface, backend))
            .await
            .map_err(|e| Error::device_unavailable(device, e))?
            .map_err(|e| Error::device_unavailable(device, e))?;

        debug!(
            "Read wireguard device {} ({} peers) via {}",
            device,
            wg_device.peers.len(),
            self.backend
        );

        let peers = wg_device
            .peers
            .iter()
            .map(|info| peer_record(&info.config))
            .collect::<std::result::Result<Vec<_>, String>>()
            .map_err(|message| Error::device_unavailable(device, message))?;
        let private_key = wg_device
            .private_key
            .as_ref()
            .map(key_from_wireguard)
            .transpose()
            .map_err(|message| Error::device_unavailable(device, message))?;

        Ok(DeviceState {
            name: device.to_string(),
            private_key,
            listen_port: wg_device.listen_port,
            fwmark: wg_device.fwmark,
            peers,
        })
    }

    async fn configure_device(&self, device: &str, config: DeviceConfig) -> Result<()> {
        let iface = interface_name(device).map_err(|message| Error::reconfigure(device, message))?;
        let update =
            device_update(&config).map_err(|message| Error::reconfigure(device, message))?;
        let backend = self.backend.as_wireguard();

        debug!(
            "Configuring wireguard device {} with {} peers (replace_peers: {})",
            device,
            config.peers.len(),
            config.replace_peers
        );

        tokio::task::spawn_blocking(move || update.apply(&iface, backend))
            .await
            .map_err(|e| Error::reconfigure(device, e))?
            .map_err(|e| Error::reconfigure(device, e))
    }

    fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

fn interface_name(device: &str) -> std::result::Result<InterfaceName, String> {
    device
        .parse::<InterfaceName>()
        .map_err(|_| format!("invalid interface name '{}'", device))
}

// Both sides speak standard base64, which keeps the conversion independent of
// either type's internal layout
fn key_from_wireguard(key: &WgKey) -> std::result::Result<Key, String> {
    Key::from_base64(&key.to_base64()).map_err(|e| e.to_string())
}

fn key_to_wireguard(key: &Key) -> std::result::Result<WgKey, String> {
    WgKey::from_base64(&key.to_base64()).map_err(|_| format!("invalid key {}", key))
}

fn peer_record(config: &PeerConfig) -> std::result::Result<PeerRecord, String> {
    Ok(PeerRecord {
        public_key: key_from_wireguard(&config.public_key)?,
        endpoint: config.endpoint,
        preshared_key: config
            .preshared_key
            .as_ref()
            .map(key_from_wireguard)
            .transpose()?,
        persistent_keepalive_interval: config.persistent_keepalive_interval,
        allowed_ips: config
            .allowed_ips
            .iter()
            .map(|allowed| AllowedIp::new(allowed.address, allowed.cidr))
            .collect(),
    })
}

fn peer_builder(peer: &PeerRecord) -> std::result::Result<PeerConfigBuilder, String> {
    let mut builder = PeerConfigBuilder::new(&key_to_wireguard(&peer.public_key)?);

    if let Some(preshared_key) = &peer.preshared_key {
        builder = builder.set_preshared_key(key_to_wireguard(preshared_key)?);
    }
    if let Some(endpoint) = peer.endpoint {
        builder = builder.set_endpoint(endpoint);
    }
    if let Some(interval) = peer.persistent_keepalive_interval {
        builder = builder.set_persistent_keepalive_interval(interval);
    }
    for allowed in &peer.allowed_ips {
        builder = builder.add_allowed_ip(allowed.address, allowed.cidr);
    }

    Ok(builder)
}

fn device_update(config: &DeviceConfig) -> std::result::Result<DeviceUpdate, String> {
    let mut update = DeviceUpdate::new();

    if let Some(private_key) = &config.private_key {
        update = update.set_private_key(key_to_wireguard(private_key)?);
    }
    if let Some(listen_port) = config.listen_port {
        update = update.set_listen_port(listen_port);
    }
    if let Some(fwmark) = config.fwmark {
        update = update.set_fwmark(fwmark);
    }
    if config.replace_peers {
        update = update.replace_peers();
    }
    for peer in &config.peers {
        update = update.add_peer(peer_builder(peer)?);
    }

    Ok(update)
}
