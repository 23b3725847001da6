//! Endpoint reconciler
//!
//! The Reconciler is responsible for:
//! - Resolving the tracked DNS name via Resolver
//! - Reading the peer's configured endpoint via TunnelControl
//! - Deciding whether the endpoint has drifted
//! - Writing the freshly resolved address when it has
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────────┐
//!     interval ───▶│  Reconciler  │──── ReconcilerEvent ───▶ (monitoring)
//!                  └──────────────┘
//!                    │          │
//!          resolve() │          │ get_device() / set_peer_endpoint()
//!                    ▼          ▼
//!            ┌──────────┐  ┌───────────────┐
//!            │ Resolver │  │ TunnelControl │
//!            └──────────┘  └───────────────┘
//! ```
//!
//! ## Tick Flow
//!
//! 1. Sleep for the configured interval
//! 2. Resolve the DNS name
//! 3. Read the device and find the peer by public key
//! 4. If the configured address is among the resolved ones, do nothing
//! 5. Otherwise write the first resolved address, keeping the port
//!
//! Each tick starts from scratch. A failed tick is logged and the next one
//! runs after the usual interval; nothing carries over between ticks.

use std::future::Future;
use std::net::IpAddr;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use crate::config::{EndpointHost, ReconcilerConfig};
use crate::error::{Error, Result};
use crate::traits::{Resolver, TunnelControl};
use crate::types::contains_address;

/// Events emitted by the Reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcilerEvent {
    /// Reconciler started
    Started {
        device: String,
    },

    /// Endpoint is a literal address; the reconciler is parked until shutdown
    Idle {
        address: IpAddr,
    },

    /// Configured endpoint already matches DNS (no write)
    InSync {
        address: IpAddr,
    },

    /// Endpoint rewritten to a freshly resolved address
    Updated {
        previous: IpAddr,
        new: IpAddr,
    },

    /// Tick failed; the next tick runs on schedule
    TickFailed {
        error: String,
    },

    /// Reconciler stopped
    Stopped {
        reason: String,
    },
}

/// Result of one successful tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The configured address is one of the resolved addresses
    InSync {
        address: IpAddr,
    },
    /// The endpoint was moved to `new`
    Updated {
        previous: IpAddr,
        new: IpAddr,
    },
}

/// Core reconciliation loop
///
/// ## Lifecycle
///
/// 1. Create with [`Reconciler::new()`]
/// 2. Start with [`Reconciler::run()`] or [`Reconciler::run_until()`]
/// 3. Reconciler runs until the shutdown future completes
///
/// ## States
///
/// - **Idle**: the endpoint host is a literal address. Nothing is resolved
///   or written; the reconciler only waits for shutdown.
/// - **Polling**: one tick per interval, forever.
///
/// ## Concurrency
///
/// Single task, strictly sequential. The device is shared with other tools
/// and no lock is taken on it, so every write is built from a device read
/// made moments before in the same tick.
pub struct Reconciler {
    /// Resolver for the tracked name
    resolver: Box<dyn Resolver>,

    /// Control plane of the tunnel subsystem
    tunnel: Box<dyn TunnelControl>,

    /// Immutable configuration
    config: ReconcilerConfig,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ReconcilerEvent>,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Parameters
    ///
    /// - `resolver`: Resolver implementation
    /// - `tunnel`: Tunnel control implementation
    /// - `config`: Reconciler configuration
    ///
    /// # Returns
    ///
    /// A tuple of (reconciler, event_receiver) where event_receiver yields reconciler events
    pub fn new(
        resolver: Box<dyn Resolver>,
        tunnel: Box<dyn TunnelControl>,
        config: ReconcilerConfig,
    ) -> Result<(Self, mpsc::Receiver<ReconcilerEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let reconciler = Self {
            resolver,
            tunnel,
            config,
            event_tx: tx,
        };

        Ok((reconciler, rx))
    }

    /// The configuration this reconciler was built with
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
    }

    /// Run until `shutdown` completes
    ///
    /// Shutdown is observed between ticks. A tick in progress is allowed to
    /// finish so that a write is never abandoned halfway.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let mut shutdown = std::pin::pin!(shutdown);

        self.emit_event(ReconcilerEvent::Started {
            device: self.config.device.clone(),
        });

        match &self.config.endpoint_host {
            EndpointHost::Address(address) => {
                info!(
                    "Configured endpoint {} is an IP address. No need to do anything. Sleeping until shutdown...",
                    address
                );
                self.emit_event(ReconcilerEvent::Idle { address: *address });
                shutdown.await;
            }
            EndpointHost::Name(name) => {
                info!(
                    "Tracking {} for peer {} on wireguard device {} every {}s via {}",
                    name,
                    self.config.peer_key,
                    self.config.device,
                    self.config.interval_secs,
                    self.tunnel.backend_name()
                );
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.interval()) => {
                            self.run_tick().await;
                        }
                        _ = &mut shutdown => break,
                    }
                }
            }
        }

        info!("Shutdown signal received");
        self.emit_event(ReconcilerEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });

        Ok(())
    }

    /// Perform one reconciliation tick
    ///
    /// Performs at most one write. Calling this repeatedly with unchanged DNS
    /// and device state performs no writes after the first.
    pub async fn tick(&self) -> Result<TickOutcome> {
        let name = self.config.endpoint_host.dns_name().ok_or_else(|| {
            Error::config(format!(
                "Endpoint {} is an IP address, nothing to resolve",
                self.config.endpoint_host
            ))
        })?;
        let device = self.config.device.as_str();
        let peer_key = &self.config.peer_key;

        let addresses = self.resolver.resolve(name).await?;
        debug!("{} resolved to {:?}", name, addresses);

        let state = self.tunnel.get_device(device).await?;
        let peer = self.tunnel.find_peer(&state, peer_key)?;
        let configured = peer
            .endpoint
            .map(|endpoint| endpoint.ip())
            .ok_or_else(|| Error::missing_endpoint(device, peer_key))?;

        if contains_address(&addresses, configured) {
            info!(
                "Correct IP {} configured on wireguard device {} for peer {}.",
                configured, device, peer_key
            );
            return Ok(TickOutcome::InSync {
                address: configured,
            });
        }

        // First-returned address wins; no preference by family or reachability
        let new = *addresses
            .first()
            .ok_or_else(|| Error::NoAddresses(name.to_string()))?;

        info!(
            "Updating IP address on wireguard interface. Configured IP is {}, correct one is {}",
            configured, new
        );
        self.tunnel
            .set_peer_endpoint(device, &state, peer_key, new)
            .await?;

        Ok(TickOutcome::Updated {
            previous: configured,
            new,
        })
    }

    /// Run one tick, logging and reporting its outcome
    async fn run_tick(&self) {
        match self.tick().await {
            Ok(TickOutcome::InSync { address }) => {
                self.emit_event(ReconcilerEvent::InSync { address });
            }
            Ok(TickOutcome::Updated { previous, new }) => {
                info!(
                    "Updated endpoint of peer {} on {}: {} -> {}",
                    self.config.peer_key, self.config.device, previous, new
                );
                self.emit_event(ReconcilerEvent::Updated { previous, new });
            }
            Err(e) => {
                error!("Reconciliation tick failed: {}", e);
                self.emit_event(ReconcilerEvent::TickFailed {
                    error: e.to_string(),
                });
            }
        }
    }

    /// Emit a reconciler event
    fn emit_event(&self, event: ReconcilerEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening; events are optional
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeviceConfig, DeviceState, KEY_LEN, Key, PeerRecord};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedResolver(Vec<IpAddr>);

    #[async_trait]
    impl Resolver for FixedResolver {
        async fn resolve(&self, _name: &str) -> Result<Vec<IpAddr>> {
            Ok(self.0.clone())
        }
    }

    struct SingleDevice {
        state: DeviceState,
        writes: std::sync::Arc<Mutex<Vec<DeviceConfig>>>,
    }

    #[async_trait]
    impl TunnelControl for SingleDevice {
        async fn get_device(&self, _device: &str) -> Result<DeviceState> {
            Ok(self.state.clone())
        }

        async fn configure_device(&self, _device: &str, config: DeviceConfig) -> Result<()> {
            self.writes.lock().unwrap().push(config);
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "test"
        }
    }

    fn peer_key() -> Key {
        Key::from_bytes([2; KEY_LEN])
    }

    fn reconciler(
        resolved: Vec<IpAddr>,
        endpoint: Option<&str>,
    ) -> (Reconciler, std::sync::Arc<Mutex<Vec<DeviceConfig>>>) {
        let writes = std::sync::Arc::new(Mutex::new(Vec::new()));
        let state = DeviceState {
            name: "wg0".to_string(),
            private_key: None,
            listen_port: Some(51820),
            fwmark: None,
            peers: vec![PeerRecord::new(
                peer_key(),
                endpoint.map(|e| e.parse().unwrap()),
            )],
        };
        let config = ReconcilerConfig::new(
            "wg0",
            peer_key(),
            EndpointHost::Name("vpn.example.com".to_string()),
        );
        let (reconciler, _rx) = Reconciler::new(
            Box::new(FixedResolver(resolved)),
            Box::new(SingleDevice {
                state,
                writes: writes.clone(),
            }),
            config,
        )
        .unwrap();
        (reconciler, writes)
    }

    #[tokio::test]
    async fn test_tick_in_sync() {
        let (reconciler, writes) =
            reconciler(vec![IpAddr::from([203, 0, 113, 7])], Some("203.0.113.7:51820"));

        assert_eq!(reconciler.config().device, "wg0");
        assert_eq!(reconciler.config().interval_secs, 60);

        let outcome = reconciler.tick().await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::InSync {
                address: IpAddr::from([203, 0, 113, 7])
            }
        );
        assert!(writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tick_updates_drifted_endpoint() {
        let (reconciler, writes) =
            reconciler(vec![IpAddr::from([192, 0, 2, 1])], Some("203.0.113.7:51820"));

        let outcome = reconciler.tick().await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Updated {
                previous: IpAddr::from([203, 0, 113, 7]),
                new: IpAddr::from([192, 0, 2, 1]),
            }
        );

        let writes = writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(
            writes[0].peers[0].endpoint,
            Some("192.0.2.1:51820".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn test_tick_empty_resolution_fails_without_write() {
        let (reconciler, writes) = reconciler(Vec::new(), Some("203.0.113.7:51820"));

        let err = reconciler.tick().await.unwrap_err();
        assert!(matches!(err, Error::NoAddresses(_)));
        assert!(writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tick_peer_without_endpoint_fails_without_write() {
        let (reconciler, writes) = reconciler(vec![IpAddr::from([192, 0, 2, 1])], None);

        let err = reconciler.tick().await.unwrap_err();
        assert!(matches!(err, Error::MissingEndpoint { .. }));
        assert!(writes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ReconcilerConfig::new(
            "wg0",
            peer_key(),
            EndpointHost::Name("vpn.example.com".to_string()),
        )
        .with_interval_secs(0);

        let result = Reconciler::new(
            Box::new(FixedResolver(Vec::new())),
            Box::new(SingleDevice {
                state: DeviceState {
                    name: "wg0".to_string(),
                    private_key: None,
                    listen_port: None,
                    fwmark: None,
                    peers: Vec::new(),
                },
                writes: Default::default(),
            }),
            config,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
