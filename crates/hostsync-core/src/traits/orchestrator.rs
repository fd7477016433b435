// # Orchestrator Trait
//
// Service listing and change notifications from a container orchestrator.
//
// ## Implementations
//
// - Docker Swarm over the Engine HTTP API: `hostsync-source-swarm` crate

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::pin::Pin;
use tokio_stream::Stream;

/// A service and its labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    /// Orchestrator-assigned service ID
    pub id: String,
    /// Human-readable service name
    pub name: String,
    /// Service labels
    pub labels: BTreeMap<String, String>,
}

/// Kind of service change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Create,
    Update,
}

/// A service change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEvent {
    /// ID of the service that changed
    pub service_id: String,
    /// What happened to it
    pub action: ServiceAction,
}

/// Stream of service change notifications
pub type ServiceEventStream =
    Pin<Box<dyn Stream<Item = Result<ServiceEvent, crate::Error>> + Send + 'static>>;

/// Trait for orchestrator API clients
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// List services carrying `enable_label=true`
    async fn list_services(&self, enable_label: &str) -> Result<Vec<Service>, crate::Error>;

    /// Fetch a single service by ID
    async fn inspect_service(&self, id: &str) -> Result<Service, crate::Error>;

    /// Subscribe to service create/update events
    ///
    /// The stream ends when the subscription is lost; callers resubscribe.
    async fn events(&self) -> Result<ServiceEventStream, crate::Error>;
}
