//! Record reconciler
//!
//! Converges one hostname's address record towards the current public IP:
//!
//! 1. List records named `<hostname>.<apex>` of the IP's address type
//! 2. None found → create
//! 3. First record already points at the IP → nothing to do
//! 4. Otherwise → update the first record in place
//!
//! The provider is the system of record; nothing is cached between calls.
//! Reconciliation of a single hostname is serialized so that two triggers
//! racing on a new hostname cannot both observe "no record" and both create.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::hostname::Hostname;
use crate::traits::{DnsProvider, RecordParams, RecordType};

/// TTL sentinel meaning "automatic"
pub const AUTO_TTL: u32 = 1;

/// Managed records are always proxied
pub const PROXIED: bool = true;

/// Annotation written on every managed record
pub const MANAGED_COMMENT: &str = "Managed by hostsync";

/// Result of reconciling one hostname
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No record existed; one was created
    Created,
    /// A record pointed elsewhere and was updated
    Updated {
        /// Content the record held before the update
        previous: String,
    },
    /// The record already pointed at the IP
    Unchanged,
    /// A provider call failed; the next pass retries
    Failed(String),
}

impl Outcome {
    /// Whether a write was issued to the provider
    pub fn is_write(&self) -> bool {
        matches!(self, Outcome::Created | Outcome::Updated { .. })
    }
}

/// Field set for a managed record pointing `hostname` at `ip`
pub fn managed_params(hostname: &Hostname, ip: IpAddr) -> RecordParams {
    RecordParams {
        record_type: RecordType::for_ip(ip),
        name: hostname.to_string(),
        content: ip.to_string(),
        ttl: AUTO_TTL,
        proxied: PROXIED,
        comment: MANAGED_COMMENT.to_string(),
    }
}

/// Compare record content with an address, tolerating textual variants
fn points_at(content: &str, ip: IpAddr) -> bool {
    content
        .parse::<IpAddr>()
        .map_or_else(|_| content == ip.to_string(), |current| current == ip)
}

/// Converges DNS records for individual hostnames
pub struct Reconciler {
    provider: Arc<dyn DnsProvider>,
    apex_domain: String,
    /// Keyed by the lowercased name; DNS names compare case-insensitively
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Reconciler {
    /// Create a reconciler for records under `apex_domain`
    pub fn new(provider: Arc<dyn DnsProvider>, apex_domain: impl Into<String>) -> Self {
        Self {
            provider,
            apex_domain: apex_domain.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The apex domain records are created under
    pub fn apex_domain(&self) -> &str {
        &self.apex_domain
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Drop the entry for `key` unless another task still holds or awaits it
    async fn release(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference in the map, one here
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(key);
        }
    }

    /// Reconcile one hostname against `ip`
    ///
    /// Never returns an error: provider failures become [`Outcome::Failed`]
    /// and are logged here.
    pub async fn reconcile(&self, hostname: &Hostname, ip: IpAddr) -> Outcome {
        let key = hostname.as_str().to_ascii_lowercase();
        let lock = self.lock_for(&key).await;
        let guard = lock.lock().await;

        let outcome = match self.converge(hostname, ip).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    "Failed to reconcile {} via {}: {}",
                    hostname.fqdn(&self.apex_domain),
                    self.provider.provider_name(),
                    e
                );
                Outcome::Failed(e.to_string())
            }
        };

        drop(guard);
        self.release(&key, lock).await;
        outcome
    }

    /// Reconcile every hostname in turn
    pub async fn reconcile_all<'a, I>(&self, hostnames: I, ip: IpAddr) -> Vec<(Hostname, Outcome)>
    where
        I: IntoIterator<Item = &'a Hostname>,
    {
        let mut outcomes = Vec::new();
        for hostname in hostnames {
            let outcome = self.reconcile(hostname, ip).await;
            outcomes.push((hostname.clone(), outcome));
        }
        outcomes
    }

    async fn converge(&self, hostname: &Hostname, ip: IpAddr) -> Result<Outcome> {
        let fqdn = hostname.fqdn(&self.apex_domain);
        let record_type = RecordType::for_ip(ip);

        let records = self.provider.list_records(&fqdn, record_type).await?;
        if records.len() > 1 {
            warn!(
                "{} {} records found for {}, using the first",
                records.len(),
                record_type.as_str(),
                fqdn
            );
        }

        let params = managed_params(hostname, ip);

        let Some(existing) = records.first() else {
            self.provider.create_record(&params).await?;
            info!("Created DNS record {} -> {}", fqdn, ip);
            return Ok(Outcome::Created);
        };

        if points_at(&existing.content, ip) {
            debug!("DNS record {} already points at {}", fqdn, ip);
            return Ok(Outcome::Unchanged);
        }

        self.provider.update_record(&existing.id, &params).await?;
        info!(
            "Updated DNS record {} -> {} (was: {})",
            fqdn, ip, existing.content
        );

        Ok(Outcome::Updated {
            previous: existing.content.clone(),
        })
    }
}
