// # Router API Trait
//
// Read access to the reverse proxy's routing table.
//
// ## Implementations
//
// - Traefik `GET /api/http/routers`: `hostsync-source-traefik` crate

use async_trait::async_trait;

/// Trait for reverse-proxy introspection clients
///
/// Returns the raw response body. Decoding and rule parsing belong to
/// `TraefikDiscovery` so that malformed payloads are handled in one place.
#[async_trait]
pub trait RouterApi: Send + Sync {
    /// Fetch the router table as a JSON document
    async fn fetch_routers(&self) -> Result<String, crate::Error>;
}
