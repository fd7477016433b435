// # Hostname Source Trait
//
// A discovery strategy: something that can tell the engine which hostnames
// should currently exist under the apex domain.
//
// ## Implementations
//
// - `TraefikDiscovery`: parses the proxy's router table
// - `LabelDiscovery`: scans orchestrator service labels

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::hostname::Hostname;

/// Hostnames contributed by a single changed service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostnameUpdate {
    /// Name of the service the hostnames came from
    pub origin: String,
    /// Hostnames derived from that service alone
    pub hostnames: BTreeSet<Hostname>,
}

/// Stream of incremental hostname updates
pub type HostnameUpdateStream = Pin<Box<dyn Stream<Item = HostnameUpdate> + Send + 'static>>;

/// Trait for hostname discovery strategies
#[async_trait]
pub trait HostnameSource: Send + Sync {
    /// Compute the full desired hostname set
    ///
    /// Results are deduplicated and ordered. An error aborts the whole pass;
    /// partial results are never returned.
    async fn discover(&self) -> Result<BTreeSet<Hostname>, crate::Error>;

    /// Subscribe to incremental updates
    ///
    /// `Ok(None)` for strategies that only support polling.
    async fn watch(&self) -> Result<Option<HostnameUpdateStream>, crate::Error> {
        Ok(None)
    }

    /// Whether a failed first discovery must stop the engine
    fn startup_discovery_required(&self) -> bool {
        false
    }

    /// Name of the strategy (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing discovery strategies from configuration
pub trait HostnameSourceFactory: Send + Sync {
    /// Create a HostnameSource for the given apex domain
    fn create(
        &self,
        config: &crate::config::DiscoveryConfig,
        apex_domain: &str,
    ) -> Result<Box<dyn HostnameSource>, crate::Error>;
}
