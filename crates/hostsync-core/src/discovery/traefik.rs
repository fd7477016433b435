//! Discovery from the Traefik router table

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::info;

use crate::error::{Error, Result};
use crate::hostname::Hostname;
use crate::rule;
use crate::traits::{HostnameSource, RouterApi};

/// Polls the proxy's `/api/http/routers` and keeps hosts under the apex
pub struct TraefikDiscovery {
    api: Box<dyn RouterApi>,
    apex_domain: String,
}

impl TraefikDiscovery {
    /// Create a discovery strategy over a router API client
    pub fn new(api: Box<dyn RouterApi>, apex_domain: impl Into<String>) -> Self {
        Self {
            api,
            apex_domain: apex_domain.into(),
        }
    }

    /// Decode a router table and extract hostnames
    ///
    /// The body must be a JSON array. Entries without a string `rule` are
    /// skipped, as are rules that name no host under the apex.
    pub fn parse_routers(&self, body: &str) -> Result<BTreeSet<Hostname>> {
        let routers: Vec<Value> = serde_json::from_str(body)
            .map_err(|e| Error::discovery(format!("Malformed router table: {}", e)))?;

        let hostnames = routers
            .iter()
            .filter_map(|router| router.get("rule").and_then(Value::as_str))
            .filter_map(|rule| rule::hostname_from_rule(rule, &self.apex_domain))
            .collect();

        Ok(hostnames)
    }
}

#[async_trait]
impl HostnameSource for TraefikDiscovery {
    async fn discover(&self) -> Result<BTreeSet<Hostname>> {
        let body = self.api.fetch_routers().await?;
        let hostnames = self.parse_routers(&body)?;

        info!("Discovered {} hostname(s) from router table", hostnames.len());
        Ok(hostnames)
    }

    fn source_name(&self) -> &'static str {
        "traefik"
    }
}
