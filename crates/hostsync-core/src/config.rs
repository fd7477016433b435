//! Configuration types for hostsync
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

/// Default Traefik API endpoint (the proxy's internal service address)
pub const DEFAULT_TRAEFIK_URL: &str = "http://traefik:80";

/// Default Docker Engine API endpoint
pub const DEFAULT_DOCKER_URL: &str = "http://localhost:2375";

/// Default label that opts a service in to DNS management
pub const DEFAULT_ENABLE_LABEL: &str = "traefik.enable";

/// Default public IP lookup services, tried in order
pub const DEFAULT_IP_SERVICES: &[&str] = &[
    "https://api.ipify.org",
    "https://ifconfig.me/ip",
    "https://icanhazip.com",
];

/// Main hostsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Apex domain all hostnames live under (e.g., "example.com")
    pub apex_domain: String,

    /// DNS provider configuration
    pub provider: ProviderConfig,

    /// Hostname discovery strategy
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Public IP lookup configuration
    #[serde(default)]
    pub ip_source: IpSourceConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Create a configuration with default discovery, IP source and engine settings
    pub fn new(apex_domain: impl Into<String>, provider: ProviderConfig) -> Self {
        Self {
            apex_domain: apex_domain.into(),
            provider,
            discovery: DiscoveryConfig::default(),
            ip_source: IpSourceConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Set the discovery strategy
    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_apex(&self.apex_domain)?;
        self.provider.validate()?;
        self.discovery.validate()?;
        self.ip_source.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

fn validate_apex(apex: &str) -> Result<(), crate::Error> {
    if apex.is_empty() {
        return Err(crate::Error::config("Apex domain cannot be empty"));
    }

    if apex.starts_with('.') || apex.ends_with('.') {
        return Err(crate::Error::config(format!(
            "Apex domain must not start or end with a dot: '{}'",
            apex
        )));
    }

    if apex.chars().any(|c| c.is_whitespace() || c == '`') {
        return Err(crate::Error::config(format!(
            "Apex domain contains invalid characters: '{}'",
            apex
        )));
    }

    Ok(())
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
        /// Zone ID the records live in
        zone_id: String,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare { api_token, zone_id } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                if zone_id.is_empty() {
                    return Err(crate::Error::config("Cloudflare zone ID cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
        }
    }
}

/// Hostname discovery strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveryConfig {
    /// Poll the Traefik router table
    Traefik {
        /// Base URL of the Traefik API
        #[serde(default = "default_traefik_url")]
        api_url: String,
        /// Optional Host header for the API request
        #[serde(default)]
        host_header: Option<String>,
    },

    /// Scan Docker Swarm service labels
    Swarm {
        /// Base URL of the Docker Engine API
        #[serde(default = "default_docker_url")]
        docker_url: String,
        /// Label a service must set to `true` to be managed
        #[serde(default = "default_enable_label")]
        enable_label: String,
        /// Subscribe to service events for incremental updates
        #[serde(default = "default_watch_events")]
        watch_events: bool,
    },
}

impl DiscoveryConfig {
    /// Validate the discovery configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            DiscoveryConfig::Traefik { api_url, .. } => validate_http_url("Traefik API", api_url),
            DiscoveryConfig::Swarm {
                docker_url,
                enable_label,
                ..
            } => {
                validate_http_url("Docker API", docker_url)?;
                if enable_label.is_empty() {
                    return Err(crate::Error::config("Enable label cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the discovery type name
    pub fn type_name(&self) -> &str {
        match self {
            DiscoveryConfig::Traefik { .. } => "traefik",
            DiscoveryConfig::Swarm { .. } => "swarm",
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig::Traefik {
            api_url: default_traefik_url(),
            host_header: None,
        }
    }
}

/// Public IP lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpSourceConfig {
    /// Plain-text HTTP lookup services
    Http {
        /// Services to query, in order of preference
        urls: Vec<String>,
    },
}

impl IpSourceConfig {
    /// Validate the IP source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            IpSourceConfig::Http { urls } => {
                if urls.is_empty() {
                    return Err(crate::Error::config("At least one IP lookup URL is required"));
                }
                for url in urls {
                    validate_http_url("IP lookup", url)?;
                }
                Ok(())
            }
        }
    }

    /// Get the IP source type name
    pub fn type_name(&self) -> &str {
        match self {
            IpSourceConfig::Http { .. } => "http",
        }
    }
}

impl Default for IpSourceConfig {
    fn default() -> Self {
        IpSourceConfig::Http {
            urls: DEFAULT_IP_SERVICES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn validate_http_url(what: &str, url: &str) -> Result<(), crate::Error> {
    if url.is_empty() {
        return Err(crate::Error::config(format!("{} URL cannot be empty", what)));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(crate::Error::config(format!(
            "{} URL must use HTTP or HTTPS scheme. Got: {}",
            what, url
        )));
    }
    Ok(())
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between full discovery + reconcile passes (in seconds)
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    /// Interval between public IP lookups (in seconds)
    #[serde(default = "default_ip_poll_interval_secs")]
    pub ip_poll_interval_secs: u64,

    /// Delay before resubscribing after the event stream ends (in seconds)
    #[serde(default = "default_resubscribe_delay_secs")]
    pub resubscribe_delay_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, new engine events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.reconcile_interval_secs == 0 {
            return Err(crate::Error::config("Reconcile interval must be > 0"));
        }
        if self.ip_poll_interval_secs == 0 {
            return Err(crate::Error::config("IP poll interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval_secs(),
            ip_poll_interval_secs: default_ip_poll_interval_secs(),
            resubscribe_delay_secs: default_resubscribe_delay_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_traefik_url() -> String {
    DEFAULT_TRAEFIK_URL.to_string()
}

fn default_docker_url() -> String {
    DEFAULT_DOCKER_URL.to_string()
}

fn default_enable_label() -> String {
    DEFAULT_ENABLE_LABEL.to_string()
}

fn default_watch_events() -> bool {
    true
}

fn default_reconcile_interval_secs() -> u64 {
    60
}

fn default_ip_poll_interval_secs() -> u64 {
    60
}

fn default_resubscribe_delay_secs() -> u64 {
    5
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloudflare() -> ProviderConfig {
        ProviderConfig::Cloudflare {
            api_token: "token".to_string(),
            zone_id: "zone".to_string(),
        }
    }

    #[test]
    fn test_defaults_validate() {
        let config = SyncConfig::new("example.com", cloudflare());
        assert!(config.validate().is_ok());
        assert_eq!(config.discovery.type_name(), "traefik");
        assert_eq!(config.engine.reconcile_interval_secs, 60);
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let config = SyncConfig::new(
            "example.com",
            ProviderConfig::Cloudflare {
                api_token: String::new(),
                zone_id: "zone".to_string(),
            },
        );
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));

        let config = SyncConfig::new(
            "example.com",
            ProviderConfig::Cloudflare {
                api_token: "token".to_string(),
                zone_id: String::new(),
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apex_validation() {
        assert!(SyncConfig::new("", cloudflare()).validate().is_err());
        assert!(SyncConfig::new("example.com.", cloudflare()).validate().is_err());
        assert!(SyncConfig::new("ex ample.com", cloudflare()).validate().is_err());
    }

    #[test]
    fn test_swarm_config_from_json() {
        let discovery: DiscoveryConfig = serde_json::from_value(serde_json::json!({
            "type": "swarm",
            "docker_url": "http://socket-proxy:2375"
        }))
        .unwrap();

        match &discovery {
            DiscoveryConfig::Swarm {
                enable_label,
                watch_events,
                ..
            } => {
                assert_eq!(enable_label, DEFAULT_ENABLE_LABEL);
                assert!(*watch_events);
            }
            other => panic!("unexpected discovery config: {:?}", other),
        }
        assert!(discovery.validate().is_ok());
    }

    #[test]
    fn test_bad_urls_rejected() {
        let discovery = DiscoveryConfig::Traefik {
            api_url: "traefik:8080".to_string(),
            host_header: None,
        };
        assert!(discovery.validate().is_err());

        let ip = IpSourceConfig::Http { urls: Vec::new() };
        assert!(ip.validate().is_err());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let engine = EngineConfig {
            reconcile_interval_secs: 0,
            ..EngineConfig::default()
        };
        assert!(engine.validate().is_err());
    }
}
