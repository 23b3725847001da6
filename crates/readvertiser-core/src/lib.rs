// # readvertiser-core
//
// Core library keeping a WireGuard peer's endpoint in sync with a DNS name.
//
// ## Architecture Overview
//
// A peer behind a dynamic IP is reached through a DNS name, but WireGuard
// resolves that name only once, when the interface is configured. This
// library re-resolves it periodically and moves the peer's endpoint when the
// address changes:
// - **Resolver**: Trait for turning a DNS name into candidate addresses
// - **TunnelControl**: Trait for reading a device and rewriting one peer's endpoint
// - **Reconciler**: Control loop that compares DNS with the device and corrects drift
// - **WgPeerTarget**: Reads the tracked peer from a wg-quick configuration file
//
// ## Design Principles
//
// 1. **Minimal blast radius**: Only the target peer's endpoint address changes;
//    every other field of every peer is written back exactly as read
// 2. **Idempotency**: A tick with nothing to correct performs no write
// 3. **Stateless ticks**: Device state is read fresh on every tick and never cached
// 4. **Library-First**: The daemon is thin glue around this crate

pub mod traits;
pub mod types;
pub mod reconciler;
pub mod resolver;
pub mod config;
pub mod wg_conf;
pub mod error;

// Re-export core types for convenience
pub use traits::{Resolver, TunnelControl};
pub use types::{AllowedIp, DeviceConfig, DeviceState, Key, PeerKey, PeerRecord};
pub use reconciler::{Reconciler, ReconcilerEvent, TickOutcome};
pub use resolver::SystemResolver;
pub use config::{EndpointHost, ReconcilerConfig};
pub use wg_conf::WgPeerTarget;
pub use error::{Error, Result};
