// # DNS Provider Trait
//
// Defines the narrow interface the reconciler needs from a DNS provider API.
//
// ## Implementations
//
// - Cloudflare: `hostsync-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use hostsync_core::reconciler::managed_params;
// use hostsync_core::traits::{DnsProvider, RecordType};
//
// let records = provider.list_records("app.example.com", RecordType::A).await?;
// if records.is_empty() {
//     provider.create_record(&managed_params(&hostname, ip)).await?;
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Address record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// IPv4 address record
    #[serde(rename = "A")]
    A,
    /// IPv6 address record
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    /// The record type matching an IP address family
    pub fn for_ip(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::Aaaa,
        }
    }

    /// Wire name of the record type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }
}

/// A DNS record as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Provider-assigned record ID
    pub id: String,
    /// Record type
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Fully qualified record name
    pub name: String,
    /// Record content (the address)
    pub content: String,
    /// Time-to-live (1 = provider automatic)
    pub ttl: u32,
    /// Whether traffic is proxied through the provider
    #[serde(default)]
    pub proxied: bool,
    /// Free-text annotation
    #[serde(default)]
    pub comment: Option<String>,
}

/// Field set sent on create and update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordParams {
    /// Record type
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Record name (bare hostname; the provider appends the zone)
    pub name: String,
    /// Address the record points at
    pub content: String,
    /// Time-to-live
    pub ttl: u32,
    /// Proxied flag
    pub proxied: bool,
    /// Annotation for human auditing
    pub comment: String,
}

/// Trait for DNS provider implementations
///
/// A provider instance is bound to a single zone. Implementations perform one
/// API call per method and never retry, cache, or decide whether a write is
/// needed; that is the reconciler's job.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List address records whose name equals `name` exactly
    ///
    /// # Parameters
    ///
    /// - `name`: Fully qualified record name (e.g., "app.example.com")
    /// - `record_type`: Address record type to filter on
    async fn list_records(
        &self,
        name: &str,
        record_type: RecordType,
    ) -> Result<Vec<DnsRecord>, crate::Error>;

    /// Create a new record
    async fn create_record(&self, params: &RecordParams) -> Result<DnsRecord, crate::Error>;

    /// Overwrite an existing record by ID
    async fn update_record(
        &self,
        record_id: &str,
        params: &RecordParams,
    ) -> Result<DnsRecord, crate::Error>;

    /// Check that the configured credentials are accepted
    ///
    /// Called once at startup; a failure here is fatal.
    async fn verify(&self) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
