// # Resolver Trait
//
// Defines the interface for turning a DNS name into candidate addresses.
//
// ## Implementations
//
// - Host resolver (getaddrinfo): `crate::resolver::SystemResolver`
// - Tests: scripted resolvers returning canned answers
//
// ## Usage
//
// ```rust,ignore
// use readvertiser_core::Resolver;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let resolver = /* Resolver implementation */;
//
//     let addresses = resolver.resolve("vpn.example.com").await?;
//     println!("first candidate: {:?}", addresses.first());
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

/// Trait for DNS resolver implementations
///
/// A resolver is a leaf component: one lookup per call, no caching, no
/// retries. The reconciler's poll interval is the only retry mechanism.
///
/// # Ordering
///
/// Addresses are returned in whatever order the underlying facility yields
/// them. The reconciler relies on that order only to pick the first address
/// when an update is needed, so implementations must not shuffle results.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `name` to its current addresses
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<IpAddr>)`: Addresses in resolution order (may be empty)
    /// - `Err(Error::Resolution)`: NXDOMAIN, timeout, network error
    async fn resolve(&self, name: &str) -> Result<Vec<IpAddr>, crate::Error>;
}
