// # hostsyncd - hostsync daemon
//
// Thin integration layer: reads configuration from the environment, wires the
// plugin crates into a registry and runs the sync engine until SIGTERM/SIGINT.
// All sync logic lives in hostsync-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### DNS Provider
// - `CF_TOKEN`: Cloudflare API token (required)
// - `CF_ZONE_ID`: Cloudflare zone ID (required)
// - `TLD`: Apex domain records are managed under (required)
// - `HOSTSYNC_MODE`: `dry-run` to log writes instead of performing them
//
// ### Discovery
// - `HOSTSYNC_DISCOVERY`: `traefik` (default) or `swarm`
// - `HOSTSYNC_TRAEFIK_URL`: Traefik API root (default `http://traefik:80`)
// - `HOSTSYNC_TRAEFIK_HOST`: Host header for the Traefik API request
// - `DOCKER_HOST`: Docker Engine API, `tcp://` or `http://` (default `http://localhost:2375`)
// - `HOSTSYNC_ENABLE_LABEL`: Opt-in label for swarm services (default `traefik.enable`)
// - `HOSTSYNC_WATCH_EVENTS`: Follow swarm service events (default `true`)
//
// ### Engine
// - `HOSTSYNC_IP_URLS`: Comma-separated public IP lookup services
// - `HOSTSYNC_RECONCILE_INTERVAL`: Seconds between full passes (default 60)
// - `HOSTSYNC_IP_POLL_INTERVAL`: Seconds between IP lookups (default 60)
// - `HOSTSYNC_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export CF_TOKEN=your_token
// export CF_ZONE_ID=your_zone_id
// export TLD=example.com
// export HOSTSYNC_TRAEFIK_URL=http://traefik:8080
//
// hostsyncd
// ```

use anyhow::{Context, Result};
use hostsync_core::config::{
    DEFAULT_DOCKER_URL, DEFAULT_ENABLE_LABEL, DEFAULT_IP_SERVICES, DEFAULT_TRAEFIK_URL,
};
use hostsync_core::traits::DnsProvider;
use hostsync_core::{
    DiscoveryConfig, EngineConfig, EngineEvent, IpSourceConfig, ProviderConfig, ProviderRegistry,
    SyncConfig, SyncEngine,
};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long the engine gets to stop its trigger tasks after a signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration, authentication or startup discovery failure
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<HostsyncExitCode> for ExitCode {
    fn from(code: HostsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

impl HostsyncExitCode {
    /// Classify a daemon failure
    fn for_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<hostsync_core::Error>() {
            Some(e) if e.is_fatal() || matches!(e, hostsync_core::Error::Discovery(_)) => {
                HostsyncExitCode::ConfigError
            }
            _ => HostsyncExitCode::RuntimeError,
        }
    }
}

/// Application configuration
///
/// No `Debug`: the token must never reach a log line.
#[derive(Clone)]
struct Config {
    api_token: String,
    zone_id: String,
    apex_domain: String,
    discovery: String,
    traefik_url: String,
    traefik_host: Option<String>,
    docker_host: String,
    enable_label: String,
    watch_events: bool,
    ip_urls: Vec<String>,
    reconcile_interval_secs: u64,
    ip_poll_interval_secs: u64,
    log_level: String,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_secs(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a whole number of seconds. Got: {}", name, raw)),
        _ => Ok(default),
    }
}

fn parse_bool(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "" => Ok(default),
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => anyhow::bail!("{} must be true or false. Got: {}", name, raw),
        },
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let ip_urls = match env::var("HOSTSYNC_IP_URLS") {
            Ok(raw) if !raw.trim().is_empty() => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => DEFAULT_IP_SERVICES.iter().map(|s| s.to_string()).collect(),
        };

        Ok(Self {
            api_token: env::var("CF_TOKEN").unwrap_or_default(),
            zone_id: env::var("CF_ZONE_ID").unwrap_or_default(),
            apex_domain: env::var("TLD").unwrap_or_default().trim().to_string(),
            discovery: var_or("HOSTSYNC_DISCOVERY", "traefik").to_lowercase(),
            traefik_url: var_or("HOSTSYNC_TRAEFIK_URL", DEFAULT_TRAEFIK_URL),
            traefik_host: env::var("HOSTSYNC_TRAEFIK_HOST")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            docker_host: var_or("DOCKER_HOST", DEFAULT_DOCKER_URL),
            enable_label: var_or("HOSTSYNC_ENABLE_LABEL", DEFAULT_ENABLE_LABEL),
            watch_events: parse_bool("HOSTSYNC_WATCH_EVENTS", true)?,
            ip_urls,
            reconcile_interval_secs: parse_secs("HOSTSYNC_RECONCILE_INTERVAL", 60)?,
            ip_poll_interval_secs: parse_secs("HOSTSYNC_IP_POLL_INTERVAL", 60)?,
            log_level: var_or("HOSTSYNC_LOG_LEVEL", "info"),
        })
    }

    /// Validate the configuration
    ///
    /// Catches the mistakes the library-level checks cannot see: missing
    /// environment variables, placeholder tokens and out-of-range intervals.
    fn validate(&self) -> Result<()> {
        if self.api_token.is_empty() {
            anyhow::bail!("CF_TOKEN is required. Set it via: export CF_TOKEN=your_token");
        }

        // Check for obvious placeholder tokens (common mistake)
        let token_lower = self.api_token.to_lowercase();
        if token_lower.contains("your_token")
            || token_lower.contains("replace_me")
            || token_lower == "token"
        {
            anyhow::bail!(
                "CF_TOKEN appears to be a placeholder. \
                Use an actual API token with Zone:DNS:Edit permission."
            );
        }

        if self.zone_id.is_empty() {
            anyhow::bail!("CF_ZONE_ID is required. Set it via: export CF_ZONE_ID=your_zone_id");
        }

        if self.apex_domain.is_empty() {
            anyhow::bail!("TLD is required. Set it via: export TLD=example.com");
        }
        validate_domain_name(&self.apex_domain)?;

        match self.discovery.as_str() {
            "traefik" | "swarm" => {}
            _ => anyhow::bail!(
                "HOSTSYNC_DISCOVERY '{}' is not supported. \
                Supported strategies: traefik, swarm",
                self.discovery
            ),
        }

        if self.ip_urls.is_empty() {
            anyhow::bail!("HOSTSYNC_IP_URLS must list at least one lookup service");
        }

        for (name, secs) in [
            ("HOSTSYNC_RECONCILE_INTERVAL", self.reconcile_interval_secs),
            ("HOSTSYNC_IP_POLL_INTERVAL", self.ip_poll_interval_secs),
        ] {
            if !(10..=86_400).contains(&secs) {
                anyhow::bail!("{} must be between 10 and 86400 seconds. Got: {}", name, secs);
            }
        }

        // Validate log level
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "HOSTSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Build the library configuration
    fn to_sync_config(&self) -> Result<SyncConfig> {
        let discovery = if self.discovery == "swarm" {
            #[cfg(feature = "swarm")]
            let docker_url = hostsync_source_swarm::docker_url_from_host(&self.docker_host)?;
            #[cfg(not(feature = "swarm"))]
            let docker_url = self.docker_host.clone();

            DiscoveryConfig::Swarm {
                docker_url,
                enable_label: self.enable_label.clone(),
                watch_events: self.watch_events,
            }
        } else {
            DiscoveryConfig::Traefik {
                api_url: self.traefik_url.clone(),
                host_header: self.traefik_host.clone(),
            }
        };

        let mut config = SyncConfig::new(
            self.apex_domain.clone(),
            ProviderConfig::Cloudflare {
                api_token: self.api_token.clone(),
                zone_id: self.zone_id.clone(),
            },
        )
        .with_discovery(discovery);

        config.ip_source = IpSourceConfig::Http {
            urls: self.ip_urls.clone(),
        };
        config.engine = EngineConfig {
            reconcile_interval_secs: self.reconcile_interval_secs,
            ip_poll_interval_secs: self.ip_poll_interval_secs,
            ..EngineConfig::default()
        };

        config.validate()?;
        Ok(config)
    }
}

/// Validate that a string is a valid domain name
///
/// Basic RFC 1035 checks; catches common typos in TLD.
fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.len() > 253 {
        anyhow::bail!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        );
    }

    for label in domain.split('.') {
        if label.is_empty() {
            anyhow::bail!("Domain name has empty label: '{}'", domain);
        }

        if label.len() > 63 {
            anyhow::bail!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            );
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            anyhow::bail!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric and hyphen only.",
                label
            );
        }

        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            );
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return HostsyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return HostsyncExitCode::ConfigError.into();
    }

    let sync_config = match config.to_sync_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration validation error: {:#}", e);
            return HostsyncExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return HostsyncExitCode::ConfigError.into();
    }

    info!(
        "Starting hostsyncd (apex: {}, discovery: {})",
        sync_config.apex_domain,
        sync_config.discovery.type_name()
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return HostsyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(sync_config).await {
            Ok(()) => HostsyncExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                HostsyncExitCode::for_error(&e)
            }
        }
    });

    result.into()
}

/// Register every plugin compiled into this build
fn build_registry() -> ProviderRegistry {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "cloudflare")]
    hostsync_provider_cloudflare::register(&registry);

    #[cfg(feature = "http")]
    hostsync_ip_http::register(&registry);

    #[cfg(feature = "traefik")]
    hostsync_source_traefik::register(&registry);

    #[cfg(feature = "swarm")]
    hostsync_source_swarm::register(&registry);

    debug!(
        "Registered providers {:?}, discovery {:?}",
        registry.list_providers(),
        registry.list_hostname_sources()
    );
    registry
}

/// Run the daemon
async fn run_daemon(config: SyncConfig) -> Result<()> {
    let registry = build_registry();

    let provider: Arc<dyn DnsProvider> = Arc::from(registry.create_provider(&config.provider)?);
    let ip_source = registry.create_ip_source(&config.ip_source)?;
    let source = registry.create_hostname_source(&config.discovery, &config.apex_domain)?;

    // A rejected token is fatal before anything else happens
    provider.verify().await?;

    let (engine, events) = SyncEngine::new(source, provider, ip_source, &config)?;
    tokio::spawn(log_events(events));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let mut engine_task =
        tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    tokio::select! {
        finished = &mut engine_task => {
            // Only startup failures end the engine without a signal
            finished.context("Engine task panicked")??;
            warn!("Engine stopped without a shutdown signal");
        }
        signal = wait_for_shutdown() => {
            info!("Received shutdown signal: {}", signal?);
            let _ = shutdown_tx.send(());

            match tokio::time::timeout(SHUTDOWN_TIMEOUT, engine_task).await {
                Ok(finished) => finished.context("Engine task panicked")??,
                Err(_) => anyhow::bail!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT),
            }
        }
    }

    info!("hostsyncd stopped");
    Ok(())
}

/// Drain engine events into the log
async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match &event {
            EngineEvent::DiscoveryFailed { trigger, error } => {
                warn!("{:?} discovery failed: {}", trigger, error)
            }
            EngineEvent::PassSkipped { trigger, reason } => {
                warn!("{:?} pass skipped: {}", trigger, reason)
            }
            _ => debug!(?event, "Engine event"),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
