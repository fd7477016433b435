//! Collaborator traits
//!
//! The engine talks to the outside world only through these interfaces.
//!
//! - [`DnsProvider`]: list/create/update address records
//! - [`IpSource`]: look up the current public IP
//! - [`RouterApi`]: fetch the reverse proxy's router table
//! - [`Orchestrator`]: list services and subscribe to service events
//! - [`HostnameSource`]: a discovery strategy built on the two above

pub mod dns_provider;
pub mod hostname_source;
pub mod ip_source;
pub mod orchestrator;
pub mod router_api;

pub use dns_provider::{DnsProvider, DnsProviderFactory, DnsRecord, RecordParams, RecordType};
pub use hostname_source::{
    HostnameSource, HostnameSourceFactory, HostnameUpdate, HostnameUpdateStream,
};
pub use ip_source::{IpSource, IpSourceFactory};
pub use orchestrator::{Orchestrator, Service, ServiceAction, ServiceEvent, ServiceEventStream};
pub use router_api::RouterApi;
