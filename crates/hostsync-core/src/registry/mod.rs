//! Plugin-based component registry
//!
//! DNS providers, IP sources and discovery strategies live in their own
//! crates and register factories here, so the daemon picks implementations
//! by configuration instead of hard-coded branches.
//!
//! ## Registration
//!
//! ```rust,ignore
//! use hostsync_core::ProviderRegistry;
//!
//! let registry = ProviderRegistry::new();
//! hostsync_provider_cloudflare::register(&registry);
//! hostsync_source_traefik::register(&registry);
//!
//! let provider = registry.create_provider(&config.provider)?;
//! let source = registry.create_hostname_source(&config.discovery, &config.apex_domain)?;
//! ```

use crate::config::{DiscoveryConfig, IpSourceConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, HostnameSource, IpSource};
use crate::traits::{DnsProviderFactory, HostnameSourceFactory, IpSourceFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Registry of component factories keyed by configuration type name
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered DNS provider factories
    providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,

    /// Registered IP source factories
    ip_sources: RwLock<HashMap<String, Box<dyn IpSourceFactory>>>,

    /// Registered discovery strategy factories
    hostname_sources: RwLock<HashMap<String, Box<dyn HostnameSourceFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name (e.g., "cloudflare")
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Register an IP source factory
    pub fn register_ip_source(&self, name: impl Into<String>, factory: Box<dyn IpSourceFactory>) {
        self.ip_sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Register a discovery strategy factory
    ///
    /// # Parameters
    ///
    /// - `name`: Discovery type name (e.g., "traefik", "swarm")
    /// - `factory`: Factory object for creating discovery strategies
    pub fn register_hostname_source(
        &self,
        name: impl Into<String>,
        factory: Box<dyn HostnameSourceFactory>,
    ) {
        self.hostname_sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Create a DNS provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error)`: If provider type is not registered or creation fails
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        let provider_type = config.type_name();
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config)
    }

    /// Create an IP source from configuration
    pub fn create_ip_source(&self, config: &IpSourceConfig) -> Result<Box<dyn IpSource>> {
        let source_type = config.type_name();
        let sources = self.ip_sources.read().unwrap_or_else(PoisonError::into_inner);

        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown IP source type: {}", source_type)))?;

        factory.create(config)
    }

    /// Create a discovery strategy from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Discovery configuration
    /// - `apex_domain`: Apex domain discovered hostnames must live under
    pub fn create_hostname_source(
        &self,
        config: &DiscoveryConfig,
        apex_domain: &str,
    ) -> Result<Box<dyn HostnameSource>> {
        let source_type = config.type_name();
        let sources = self
            .hostname_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown discovery type: {}", source_type)))?;

        factory.create(config, apex_domain)
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.keys().cloned().collect()
    }

    /// List all registered discovery types
    pub fn list_hostname_sources(&self) -> Vec<String> {
        let sources = self
            .hostname_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        sources.keys().cloned().collect()
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(name)
    }

    /// Check if an IP source type is registered
    pub fn has_ip_source(&self, name: &str) -> bool {
        let sources = self.ip_sources.read().unwrap_or_else(PoisonError::into_inner);
        sources.contains_key(name)
    }

    /// Check if a discovery type is registered
    pub fn has_hostname_source(&self, name: &str) -> bool {
        let sources = self
            .hostname_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        sources.contains_key(name)
    }
}
