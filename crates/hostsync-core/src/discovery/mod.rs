//! Hostname discovery strategies
//!
//! Two interchangeable [`HostnameSource`](crate::traits::HostnameSource)
//! implementations with the same output contract: a deduplicated, ordered set
//! of bare hostnames under the apex domain.
//!
//! - [`TraefikDiscovery`]: fetches the proxy's router table and parses each rule
//! - [`LabelDiscovery`]: lists opted-in orchestrator services and scans their labels

pub mod labels;
pub mod traefik;

pub use labels::{LabelDiscovery, hostnames_from_labels};
pub use traefik::TraefikDiscovery;
