// # WireGuard Configuration File
//
// Reads the tracked peer out of a wg-quick style configuration file.
//
// ```ini
// [Interface]
// PrivateKey = ...
// ListenPort = 51820
//
// [Peer]
// PublicKey = BAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQ=
// Endpoint = vpn.example.com:51820
// AllowedIPs = 10.0.0.0/24
// ```
//
// The file is read once at startup. Only `PublicKey` and `Endpoint` of the
// last `[Peer]` section are used; everything else belongs to wg-quick.

use ini::{Ini, ParseOption, Properties};
use std::path::{Path, PathBuf};

use crate::config::{EndpointHost, split_endpoint};
use crate::error::{Error, Result};
use crate::types::PeerKey;

/// Directory wg-quick reads interface configurations from
pub const DEFAULT_CONFIG_DIR: &str = "/etc/wireguard";

/// The peer readvertiser tracks, as described by a configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WgPeerTarget {
    /// Decoded `PublicKey`
    pub peer_key: PeerKey,
    /// Host part of `Endpoint`
    pub endpoint_host: EndpointHost,
    /// Port part of `Endpoint`
    pub endpoint_port: u16,
}

impl WgPeerTarget {
    /// Path of the configuration file for `device` inside `dir`
    pub fn config_path(dir: impl AsRef<Path>, device: &str) -> PathBuf {
        dir.as_ref().join(format!("{}.conf", device))
    }

    /// Read the target peer from a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Fail to read wireguard config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_str(&contents)
    }

    /// Read the target peer from configuration file contents
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self> {
        let options = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..Default::default()
        };
        let ini = Ini::load_from_str_opt(contents, options)
            .map_err(|e| Error::config(format!("Invalid wireguard config: {}", e)))?;

        // Duplicate [Peer] sections are normal; the last one wins
        let peer = ini
            .iter()
            .filter(|(name, _)| name.is_some_and(|n| n.eq_ignore_ascii_case("peer")))
            .map(|(_, props)| props)
            .last()
            .ok_or_else(|| Error::config("No peer section in wireguard configuration."))?;

        let public_key = lookup(peer, "PublicKey")
            .ok_or_else(|| Error::config("No public Key in peer section"))?;
        let endpoint = lookup(peer, "Endpoint")
            .ok_or_else(|| Error::config("No endpoint in peer section"))?;

        let peer_key = PeerKey::from_base64(public_key)?;
        let (host, endpoint_port) = split_endpoint(endpoint)?;

        Ok(Self {
            peer_key,
            endpoint_host: EndpointHost::parse(&host),
            endpoint_port,
        })
    }
}

// wg-quick treats keys case-insensitively
fn lookup<'a>(props: &'a Properties, key: &str) -> Option<&'a str> {
    props
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim())
}
