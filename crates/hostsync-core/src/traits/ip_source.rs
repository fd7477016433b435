// # IP Source Trait
//
// Defines the interface for looking up the host's current public IP.
//
// ## Implementations
//
// - HTTP lookup services: `hostsync-ip-http` crate
//
// Change detection is not the source's concern; the `IpObserver` in this
// crate holds the previous value and compares.

use async_trait::async_trait;
use std::net::IpAddr;

/// Trait for public IP lookup implementations
///
/// Implementations must be thread-safe and usable across async tasks.
/// A lookup is a single request; no caching, no polling loops.
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Look up the current public IP address
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: The current public IP
    /// - `Err(Error)`: If no lookup service answered with a usable address
    async fn current(&self) -> Result<IpAddr, crate::Error>;

    /// Name of the source (for logging/debugging)
    fn source_name(&self) -> &'static str {
        "ip"
    }
}

/// Helper trait for constructing IP sources from configuration
pub trait IpSourceFactory: Send + Sync {
    /// Create an IpSource instance from configuration
    fn create(
        &self,
        config: &crate::config::IpSourceConfig,
    ) -> Result<Box<dyn IpSource>, crate::Error>;
}
