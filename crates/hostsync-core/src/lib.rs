// # hostsync-core
//
// Core library keeping a DNS zone's address records in step with the
// hostnames a reverse proxy exposes and with the host's public IP.
//
// ## Architecture Overview
//
// - **Rule parser** (`rule`): pulls the first backtick literal out of a routing rule
// - **HostnameSource**: discovery strategy (Traefik router table or Swarm labels)
// - **IpObserver**: holds the public IP and detects changes
// - **Reconciler**: list-then-create-or-update per hostname, serialized per name
// - **SyncEngine**: timer, IP-change and service-event triggers
// - **ProviderRegistry**: plugin registry for providers, IP sources and discovery
//
// ## Design Principles
//
// 1. **Provider is the system of record**: record state is re-read every pass
// 2. **Idempotent convergence**: a pass with nothing to change writes nothing
// 3. **Additive only**: records are created and updated, never deleted
// 4. **Library-first**: the daemon is a thin wiring layer over this crate

pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod hostname;
pub mod observer;
pub mod reconciler;
pub mod registry;
pub mod rule;
pub mod traits;

// Re-export core types for convenience
pub use config::{DiscoveryConfig, EngineConfig, IpSourceConfig, ProviderConfig, SyncConfig};
pub use discovery::{LabelDiscovery, TraefikDiscovery};
pub use engine::{EngineEvent, PassSummary, SyncEngine, Trigger};
pub use error::{Error, Result};
pub use hostname::Hostname;
pub use observer::{IpObservation, IpObserver};
pub use reconciler::{Outcome, Reconciler};
pub use registry::ProviderRegistry;
pub use traits::{DnsProvider, HostnameSource, IpSource, Orchestrator, RouterApi};
