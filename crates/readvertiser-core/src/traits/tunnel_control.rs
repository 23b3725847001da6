// # Tunnel Control Trait
//
// Defines the interface to the tunnel subsystem's control plane.
//
// ## Implementations
//
// - WireGuard (kernel netlink or userspace UAPI): `readvertiser-wireguard` crate
// - Tests: in-memory devices that record every write
//
// ## Call Pattern
//
// The only write readvertiser performs is read-modify-write of one peer's
// endpoint:
//
// ```rust,ignore
// let state = tunnel.get_device("wg0").await?;
// tunnel.set_peer_endpoint("wg0", &state, &peer_key, new_ip).await?;
// ```
//
// The state passed to `set_peer_endpoint` must be the one read immediately
// before. Reusing an older snapshot widens the window for losing a
// concurrent external change.

use async_trait::async_trait;
use std::net::IpAddr;

use crate::error::Error;
use crate::types::{DeviceConfig, DeviceState, PeerKey, PeerRecord};

/// Trait for tunnel control-plane implementations
///
/// # Trust Level: Semi-Trusted
///
/// Backends perform privileged I/O against a resource shared with other
/// tools (`wg`, `wg-quick`, network managers). They must:
///
/// - Read the device fresh on every `get_device()` call (no caching)
/// - Submit every peer in a [`DeviceConfig`] (omitting one can delete it)
/// - Honour `DeviceConfig::replace_peers` exactly as given
/// - Never retry; the reconciler's next tick is the retry
#[async_trait]
pub trait TunnelControl: Send + Sync {
    /// Read the current state of a device
    ///
    /// # Returns
    ///
    /// - `Ok(DeviceState)`: Device-level settings and every peer
    /// - `Err(Error::DeviceUnavailable)`: Interface missing or control channel unavailable
    async fn get_device(&self, device: &str) -> Result<DeviceState, Error>;

    /// Submit a configuration write for a device
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The subsystem accepted the write
    /// - `Err(Error::Reconfigure)`: Invalid field, permission denied, etc.
    async fn configure_device(&self, device: &str, config: DeviceConfig) -> Result<(), Error>;

    /// Get the backend name (for logging)
    fn backend_name(&self) -> &'static str;

    /// Find the peer identified by `key` in a device state
    fn find_peer<'a>(&self, state: &'a DeviceState, key: &PeerKey) -> Result<&'a PeerRecord, Error> {
        state
            .find_peer(key)
            .ok_or_else(|| Error::peer_not_found(&state.name, key))
    }

    /// Move one peer's endpoint to `new_ip`, keeping its port
    ///
    /// Every other field of every peer, and the device-level settings, are
    /// resubmitted unchanged from `state`.
    async fn set_peer_endpoint(
        &self,
        device: &str,
        state: &DeviceState,
        key: &PeerKey,
        new_ip: IpAddr,
    ) -> Result<(), Error> {
        let config = DeviceConfig::with_peer_endpoint(state, key, new_ip)?;
        self.configure_device(device, config).await
    }
}
