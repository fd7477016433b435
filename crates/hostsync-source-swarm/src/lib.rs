// # Docker Swarm Source
//
// `Orchestrator` implementation over the Docker Engine HTTP API. Label
// scanning and hostname extraction live in `hostsync_core::LabelDiscovery`;
// this crate lists services, inspects them and follows the event feed.
//
// ## API Reference
//
// - List services: GET `/services?filters={"label":["<label>=true"]}`
// - Inspect service: GET `/services/:id`
// - Events: GET `/events?filters={"type":["service"],"event":["create","update"]}`
//   (newline-delimited JSON, held open by the daemon)
//
// Only TCP endpoints are supported; a `unix://` DOCKER_HOST has to be exposed
// through a socket proxy first.

use async_trait::async_trait;
use hostsync_core::config::DiscoveryConfig;
use hostsync_core::traits::{
    HostnameSource, HostnameSourceFactory, Orchestrator, Service, ServiceAction, ServiceEvent,
    ServiceEventStream,
};
use hostsync_core::{Error, LabelDiscovery, ProviderRegistry, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Timeout for list and inspect calls; the event feed has none
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// A service object as returned by list and inspect
#[derive(Debug, Deserialize)]
struct ServiceObject {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Spec")]
    spec: ServiceSpec,
}

#[derive(Debug, Deserialize)]
struct ServiceSpec {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Labels", default)]
    labels: Option<BTreeMap<String, String>>,
}

impl From<ServiceObject> for Service {
    fn from(object: ServiceObject) -> Self {
        Service {
            id: object.id,
            name: object.spec.name,
            labels: object.spec.labels.unwrap_or_default(),
        }
    }
}

/// One line of the event feed
#[derive(Debug, Deserialize)]
struct EventMessage {
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(rename = "Action", default)]
    action: String,
    #[serde(rename = "Actor")]
    actor: Option<EventActor>,
}

#[derive(Debug, Deserialize)]
struct EventActor {
    #[serde(rename = "ID")]
    id: String,
}

/// Decode one event line
///
/// Returns `None` for blank lines and for events other than service
/// create/update.
fn parse_event_line(line: &[u8]) -> Option<Result<ServiceEvent>> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }

    let message: EventMessage = match serde_json::from_slice(line) {
        Ok(message) => message,
        Err(e) => return Some(Err(Error::discovery(format!("Malformed Docker event: {}", e)))),
    };

    if message.kind != "service" {
        return None;
    }

    let action = match message.action.as_str() {
        "create" => ServiceAction::Create,
        "update" => ServiceAction::Update,
        _ => return None,
    };

    Some(match message.actor {
        Some(actor) => Ok(ServiceEvent {
            service_id: actor.id,
            action,
        }),
        None => Err(Error::discovery("Docker service event without actor")),
    })
}

/// Turn a DOCKER_HOST value into an HTTP base URL
///
/// `tcp://host:port` becomes `http://host:port`; `http(s)://` passes through.
pub fn docker_url_from_host(docker_host: &str) -> Result<String> {
    if let Some(rest) = docker_host.strip_prefix("tcp://") {
        return Ok(format!("http://{}", rest));
    }
    if docker_host.starts_with("http://") || docker_host.starts_with("https://") {
        return Ok(docker_host.to_string());
    }
    Err(Error::config(format!(
        "Unsupported DOCKER_HOST '{}': expose the Docker API over tcp:// or http://",
        docker_host
    )))
}

/// Docker Engine API client
#[derive(Debug, Clone)]
pub struct DockerApi {
    base_url: String,
    client: reqwest::Client,
}

impl DockerApi {
    /// Create a client for the Engine API at `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::http(format!("Docker API unreachable at {}: {}", url, e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::not_found(format!("Docker resource {}", path)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::http(format!(
                "Docker API answered HTTP {}: {}",
                status,
                body.trim()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::http(format!("Failed to read Docker response: {}", e)))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl Orchestrator for DockerApi {
    async fn list_services(&self, enable_label: &str) -> Result<Vec<Service>> {
        let filters = serde_json::json!({ "label": [format!("{}=true", enable_label)] });
        let services: Vec<ServiceObject> = self
            .get_json("/services", &[("filters", filters.to_string())])
            .await?;

        tracing::debug!("Docker listed {} service(s) with {}=true", services.len(), enable_label);
        Ok(services.into_iter().map(Service::from).collect())
    }

    async fn inspect_service(&self, id: &str) -> Result<Service> {
        let service: ServiceObject = self.get_json(&format!("/services/{}", id), &[]).await?;
        Ok(service.into())
    }

    async fn events(&self) -> Result<ServiceEventStream> {
        let url = format!("{}/events", self.base_url);
        let filters = serde_json::json!({
            "type": ["service"],
            "event": ["create", "update"],
        });

        let mut response = self
            .client
            .get(&url)
            .query(&[("filters", filters.to_string())])
            .send()
            .await
            .map_err(|e| Error::http(format!("Docker event feed unreachable at {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::http(format!(
                "Docker event feed answered HTTP {}",
                response.status()
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut buffer: Vec<u8> = Vec::new();

            loop {
                let chunk = tokio::select! {
                    _ = tx.closed() => break,
                    chunk = response.chunk() => chunk,
                };

                match chunk {
                    Ok(Some(bytes)) => {
                        buffer.extend_from_slice(&bytes);
                        while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
                            let line: Vec<u8> = buffer.drain(..=end).collect();
                            if let Some(event) = parse_event_line(&line)
                                && tx.send(event).is_err()
                            {
                                return;
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("Docker event feed closed by server");
                        break;
                    }
                    Err(e) => {
                        let _ = tx.send(Err(Error::http(format!("Docker event feed broke: {}", e))));
                        break;
                    }
                }
            }
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

/// Factory for label-based discovery on Docker Swarm
pub struct SwarmFactory;

impl HostnameSourceFactory for SwarmFactory {
    fn create(
        &self,
        config: &DiscoveryConfig,
        apex_domain: &str,
    ) -> Result<Box<dyn HostnameSource>> {
        match config {
            DiscoveryConfig::Swarm {
                docker_url,
                enable_label,
                watch_events,
            } => {
                let api = DockerApi::new(docker_url.clone())?;
                Ok(Box::new(LabelDiscovery::new(
                    Arc::new(api),
                    apex_domain,
                    enable_label.clone(),
                    *watch_events,
                )))
            }
            _ => Err(Error::config("Invalid config for Swarm discovery")),
        }
    }
}

/// Register Swarm discovery with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_hostname_source("swarm", Box::new(SwarmFactory));
}
