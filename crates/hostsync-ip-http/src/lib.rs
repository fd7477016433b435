// # HTTP IP Source
//
// Looks up the host's public IP from plain-text "what is my IP" services.
//
// ## Architecture
//
// Services are tried in order; the first one answering with a parseable
// address wins. Nothing is cached here: the engine's IP observer holds the
// last known address and decides whether it changed.

use hostsync_core::ProviderRegistry;
use hostsync_core::config::IpSourceConfig;
use hostsync_core::traits::{IpSource, IpSourceFactory};
use hostsync_core::{Error, Result};

use std::net::IpAddr;
use std::time::Duration;

/// Per-service request timeout
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP-based public IP source with ordered fallback
pub struct HttpIpSource {
    /// Lookup services, in preference order
    urls: Vec<String>,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpIpSource {
    /// Create a new HTTP IP source
    ///
    /// # Parameters
    ///
    /// - `urls`: Services to query (e.g., "https://api.ipify.org"), first preferred
    pub fn new(urls: Vec<String>) -> Result<Self> {
        if urls.is_empty() {
            return Err(Error::config("At least one IP lookup URL is required"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { urls, client })
    }

    /// Fetch the IP from one service
    async fn fetch_ip(&self, url: &str) -> Result<IpAddr> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::ip_lookup(format!("Request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::ip_lookup(format!(
                "{} answered HTTP {}",
                url,
                response.status()
            )));
        }

        let ip_text = response
            .text()
            .await
            .map_err(|e| Error::ip_lookup(format!("Failed to read response: {}", e)))?;

        parse_ip(&ip_text)
    }
}

/// Parse a service's plain-text answer
fn parse_ip(body: &str) -> Result<IpAddr> {
    let ip_text = body.trim();
    ip_text
        .parse()
        .map_err(|_| Error::ip_lookup(format!("Invalid IP address: {}", ip_text)))
}

#[async_trait::async_trait]
impl IpSource for HttpIpSource {
    async fn current(&self) -> Result<IpAddr> {
        let mut last_error = None;

        for url in &self.urls {
            match self.fetch_ip(url).await {
                Ok(ip) => {
                    tracing::debug!("Public IP {} from {}", ip, url);
                    return Ok(ip);
                }
                Err(e) => {
                    tracing::warn!("IP lookup via {} failed: {}", url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::ip_lookup("No IP lookup services configured")))
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}

/// Factory for creating HTTP IP sources
pub struct HttpFactory;

impl IpSourceFactory for HttpFactory {
    fn create(&self, config: &IpSourceConfig) -> Result<Box<dyn IpSource>> {
        match config {
            IpSourceConfig::Http { urls } => Ok(Box::new(HttpIpSource::new(urls.clone())?)),
        }
    }
}

/// Register the HTTP IP source with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_ip_source("http", Box::new(HttpFactory));
}
