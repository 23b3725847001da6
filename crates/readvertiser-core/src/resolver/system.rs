// # System Resolver
//
// Resolver backed by the host's standard name resolution (getaddrinfo via
// tokio's `lookup_host`).
//
// ## Behavior
//
// - Honors /etc/hosts, nsswitch and the system resolver configuration
// - No caching: every call performs a fresh lookup
// - Order is preserved; repeated addresses are reported once

use async_trait::async_trait;
use std::net::IpAddr;
use tracing::debug;

use crate::Error;
use crate::traits::Resolver;

/// Resolver using the host's name resolution facility
///
/// # Example
///
/// ```rust,no_run
/// use readvertiser_core::resolver::SystemResolver;
/// use readvertiser_core::traits::Resolver;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let resolver = SystemResolver::new();
///     let addresses = resolver.resolve("vpn.example.com").await?;
///     println!("{:?}", addresses);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SystemResolver;

impl SystemResolver {
    /// Create a new system resolver
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>, Error> {
        // The port is irrelevant; lookup_host needs one to build socket addresses
        let resolved = tokio::net::lookup_host((name, 0))
            .await
            .map_err(|e| Error::resolution(name, e))?;

        let mut addresses: Vec<IpAddr> = Vec::new();
        for addr in resolved {
            let ip = addr.ip();
            if !addresses.contains(&ip) {
                addresses.push(ip);
            }
        }

        debug!("Resolved {} to {:?}", name, addresses);
        Ok(addresses)
    }
}
