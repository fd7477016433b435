//! Discovery from orchestrator service labels
//!
//! Services opt in with `<enable_label>=true`. Every label whose key mentions
//! `rule` and whose value mentions `Host` is run through the rule parser.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::hostname::Hostname;
use crate::rule;
use crate::traits::{
    HostnameSource, HostnameUpdate, HostnameUpdateStream, Orchestrator, Service,
};

/// Extract hostnames under `apex` from a service's labels
pub fn hostnames_from_labels(labels: &BTreeMap<String, String>, apex: &str) -> BTreeSet<Hostname> {
    labels
        .iter()
        .filter(|(key, value)| key.to_ascii_lowercase().contains("rule") && value.contains("Host"))
        .filter_map(|(_, value)| rule::hostname_from_rule(value, apex))
        .collect()
}

/// Lists opted-in services and scans their routing labels
pub struct LabelDiscovery {
    orchestrator: Arc<dyn Orchestrator>,
    apex_domain: String,
    enable_label: String,
    watch_events: bool,
}

impl LabelDiscovery {
    /// Create a label-scanning strategy
    ///
    /// # Parameters
    ///
    /// - `orchestrator`: Orchestrator API client
    /// - `apex_domain`: Apex domain hostnames must live under
    /// - `enable_label`: Label that must be `true` for a service to be managed
    /// - `watch_events`: Whether [`HostnameSource::watch`] subscribes to events
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        apex_domain: impl Into<String>,
        enable_label: impl Into<String>,
        watch_events: bool,
    ) -> Self {
        Self {
            orchestrator,
            apex_domain: apex_domain.into(),
            enable_label: enable_label.into(),
            watch_events,
        }
    }

    fn is_enabled(service: &Service, enable_label: &str) -> bool {
        service
            .labels
            .get(enable_label)
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }

    /// Hostnames contributed by one service, or `None` if it has not opted in
    fn service_hostnames(service: &Service, enable_label: &str, apex: &str) -> Option<BTreeSet<Hostname>> {
        if !Self::is_enabled(service, enable_label) {
            debug!("Service {} is not enabled, skipping", service.name);
            return None;
        }
        Some(hostnames_from_labels(&service.labels, apex))
    }
}

#[async_trait]
impl HostnameSource for LabelDiscovery {
    async fn discover(&self) -> Result<BTreeSet<Hostname>> {
        let services = self
            .orchestrator
            .list_services(&self.enable_label)
            .await
            .map_err(|e| Error::discovery(format!("Failed to list services: {}", e)))?;

        let mut hostnames = BTreeSet::new();
        for service in &services {
            if let Some(found) =
                Self::service_hostnames(service, &self.enable_label, &self.apex_domain)
            {
                hostnames.extend(found);
            }
        }

        info!(
            "Discovered {} hostname(s) from {} service(s)",
            hostnames.len(),
            services.len()
        );
        Ok(hostnames)
    }

    async fn watch(&self) -> Result<Option<HostnameUpdateStream>> {
        if !self.watch_events {
            return Ok(None);
        }

        let mut events = self.orchestrator.events().await?;
        let (tx, rx) = mpsc::unbounded_channel();

        let orchestrator = Arc::clone(&self.orchestrator);
        let apex = self.apex_domain.clone();
        let enable_label = self.enable_label.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = tx.closed() => break,
                    next = events.next() => match next {
                        Some(event) => event,
                        None => {
                            warn!("Service event stream ended");
                            break;
                        }
                    },
                };

                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("Service event stream error: {}", e);
                        continue;
                    }
                };

                debug!("Service {:?}: {}", event.action, event.service_id);

                let service = match orchestrator.inspect_service(&event.service_id).await {
                    Ok(service) => service,
                    Err(e) => {
                        warn!("Failed to inspect service {}: {}", event.service_id, e);
                        continue;
                    }
                };

                let Some(hostnames) = Self::service_hostnames(&service, &enable_label, &apex)
                else {
                    continue;
                };

                let update = HostnameUpdate {
                    origin: service.name,
                    hostnames,
                };
                if tx.send(update).is_err() {
                    break;
                }
            }
        });

        Ok(Some(Box::pin(UnboundedReceiverStream::new(rx))))
    }

    fn startup_discovery_required(&self) -> bool {
        true
    }

    fn source_name(&self) -> &'static str {
        "swarm"
    }
}
