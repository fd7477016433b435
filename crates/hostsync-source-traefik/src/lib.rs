// # Traefik Router Source
//
// `RouterApi` implementation reading the router table from Traefik's API
// (`GET /api/http/routers`). Decoding the table and extracting hostnames is
// done by `hostsync_core::TraefikDiscovery`; this crate only moves bytes.

use hostsync_core::config::DiscoveryConfig;
use hostsync_core::traits::{HostnameSource, HostnameSourceFactory, RouterApi};
use hostsync_core::{Error, ProviderRegistry, Result, TraefikDiscovery};

use std::time::Duration;

/// Path of the router listing relative to the API root
const ROUTERS_PATH: &str = "/api/http/routers";

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the Traefik API
#[derive(Debug)]
pub struct TraefikRouterApi {
    base_url: String,

    /// Host header for setups where the API sits behind a Host() router
    host_header: Option<String>,

    client: reqwest::Client,
}

impl TraefikRouterApi {
    /// Create a client for the API at `base_url` (e.g. "http://traefik:80")
    pub fn new(base_url: impl Into<String>, host_header: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            host_header,
            client,
        })
    }

    fn routers_url(&self) -> String {
        format!("{}{}", self.base_url, ROUTERS_PATH)
    }
}

#[async_trait::async_trait]
impl RouterApi for TraefikRouterApi {
    async fn fetch_routers(&self) -> Result<String> {
        let url = self.routers_url();
        let mut request = self.client.get(&url);
        if let Some(host) = &self.host_header {
            request = request.header(reqwest::header::HOST, host);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::discovery(format!("Traefik API unreachable at {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::discovery(format!(
                "Traefik API answered HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::discovery(format!("Failed to read Traefik response: {}", e)))?;

        tracing::debug!("Fetched {} bytes of router table from {}", body.len(), url);
        Ok(body)
    }
}

/// Factory for Traefik-based discovery
pub struct TraefikFactory;

impl HostnameSourceFactory for TraefikFactory {
    fn create(
        &self,
        config: &DiscoveryConfig,
        apex_domain: &str,
    ) -> Result<Box<dyn HostnameSource>> {
        match config {
            DiscoveryConfig::Traefik {
                api_url,
                host_header,
            } => {
                let api = TraefikRouterApi::new(api_url.clone(), host_header.clone())?;
                Ok(Box::new(TraefikDiscovery::new(Box::new(api), apex_domain)))
            }
            _ => Err(Error::config("Invalid config for Traefik discovery")),
        }
    }
}

/// Register Traefik discovery with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_hostname_source("traefik", Box::new(TraefikFactory));
}
