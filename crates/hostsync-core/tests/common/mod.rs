//! Test doubles and common utilities for contract tests
//!
//! In-process fakes for every collaborator the engine talks to. Each fake
//! shares its state through `Arc`s so a test can keep a handle after giving
//! a clone to the engine.

#![allow(dead_code)]

use hostsync_core::config::{EngineConfig, ProviderConfig, SyncConfig};
use hostsync_core::error::{Error, Result};
use hostsync_core::traits::{
    DnsProvider, DnsRecord, IpSource, Orchestrator, RecordParams, RecordType, RouterApi, Service,
    ServiceAction, ServiceEvent, ServiceEventStream,
};
use hostsync_core::Hostname;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const APEX: &str = "example.com";

/// In-memory DNS zone that counts every API call
#[derive(Clone, Default)]
pub struct MemoryDnsProvider {
    records: Arc<Mutex<Vec<DnsRecord>>>,
    list_calls: Arc<AtomicUsize>,
    create_calls: Arc<AtomicUsize>,
    update_calls: Arc<AtomicUsize>,
    next_id: Arc<AtomicUsize>,
    fail_all: Arc<AtomicBool>,
    list_delay_ms: Arc<AtomicUsize>,
}

impl MemoryDnsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing record with a fully qualified name
    pub fn with_record(self, fqdn: &str, content: &str) -> Self {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().push(DnsRecord {
            id: format!("seed-{}", id),
            record_type: RecordType::A,
            name: fqdn.to_string(),
            content: content.to_string(),
            ttl: 300,
            proxied: false,
            comment: None,
        });
        self
    }

    /// Delay every list call, widening the read-then-write window
    pub fn with_list_delay(self, delay: Duration) -> Self {
        self.list_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
        self
    }

    /// Make every API call fail
    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.create_calls() + self.update_calls()
    }

    pub fn records(&self) -> Vec<DnsRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn records_named(&self, fqdn: &str) -> Vec<DnsRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.name == fqdn)
            .collect()
    }

    fn check_failing(&self) -> Result<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(Error::provider("memory", "injected failure"));
        }
        Ok(())
    }

    fn to_record(&self, id: String, params: &RecordParams) -> DnsRecord {
        DnsRecord {
            id,
            record_type: params.record_type,
            name: format!("{}.{}", params.name, APEX),
            content: params.content.clone(),
            ttl: params.ttl,
            proxied: params.proxied,
            comment: Some(params.comment.clone()),
        }
    }
}

#[async_trait::async_trait]
impl DnsProvider for MemoryDnsProvider {
    async fn list_records(&self, name: &str, record_type: RecordType) -> Result<Vec<DnsRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;

        let delay = self.list_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }

        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.name == name && r.record_type == record_type)
            .cloned()
            .collect())
    }

    async fn create_record(&self, params: &RecordParams) -> Result<DnsRecord> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;

        let id = format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = self.to_record(id, params);
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn update_record(&self, record_id: &str, params: &RecordParams) -> Result<DnsRecord> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;

        let updated = self.to_record(record_id.to_string(), params);
        let mut records = self.records.lock().unwrap();
        let slot = records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| Error::not_found(record_id.to_string()))?;
        *slot = updated.clone();
        Ok(updated)
    }

    async fn verify(&self) -> Result<()> {
        self.check_failing()
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

/// IP source whose answer the test controls
#[derive(Clone)]
pub struct ControlledIpSource {
    ip: Arc<Mutex<Option<IpAddr>>>,
    lookups: Arc<AtomicUsize>,
}

impl ControlledIpSource {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip: Arc::new(Mutex::new(Some(ip))),
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A source whose lookups fail until `set_ip` is called
    pub fn unavailable() -> Self {
        Self {
            ip: Arc::new(Mutex::new(None)),
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_ip(&self, ip: IpAddr) {
        *self.ip.lock().unwrap() = Some(ip);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpSource for ControlledIpSource {
    async fn current(&self) -> Result<IpAddr> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.ip
            .lock()
            .unwrap()
            .ok_or_else(|| Error::ip_lookup("lookup service unreachable"))
    }

    fn source_name(&self) -> &'static str {
        "controlled"
    }
}

/// Router API serving a replaceable body
#[derive(Clone)]
pub struct StaticRouterApi {
    body: Arc<Mutex<Result<String>>>,
    fetches: Arc<AtomicUsize>,
}

impl StaticRouterApi {
    pub fn new(body: &str) -> Self {
        Self {
            body: Arc::new(Mutex::new(Ok(body.to_string()))),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A router table with one `Host()` rule per FQDN
    pub fn with_hosts(fqdns: &[&str]) -> Self {
        Self::new(&routers_json(fqdns))
    }

    pub fn set_body(&self, body: &str) {
        *self.body.lock().unwrap() = Ok(body.to_string());
    }

    pub fn set_unreachable(&self) {
        *self.body.lock().unwrap() = Err(Error::discovery("connection refused"));
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RouterApi for StaticRouterApi {
    async fn fetch_routers(&self) -> Result<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match &*self.body.lock().unwrap() {
            Ok(body) => Ok(body.clone()),
            Err(e) => Err(Error::discovery(e.to_string())),
        }
    }
}

pub fn routers_json(fqdns: &[&str]) -> String {
    let routers: Vec<serde_json::Value> = fqdns
        .iter()
        .enumerate()
        .map(|(i, fqdn)| {
            serde_json::json!({
                "name": format!("router{}@docker", i),
                "rule": format!("Host(`{}`)", fqdn),
                "status": "enabled",
            })
        })
        .collect();
    serde_json::Value::Array(routers).to_string()
}

/// Orchestrator with an in-memory service table and a test-driven event feed
#[derive(Clone)]
pub struct FakeOrchestrator {
    services: Arc<Mutex<Vec<Service>>>,
    fail_listing: Arc<AtomicBool>,
    event_tx: mpsc::UnboundedSender<Result<ServiceEvent>>,
    event_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<Result<ServiceEvent>>>>>,
    subscriptions: Arc<AtomicUsize>,
}

impl FakeOrchestrator {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            services: Arc::new(Mutex::new(Vec::new())),
            fail_listing: Arc::new(AtomicBool::new(false)),
            event_tx,
            event_rx: Arc::new(Mutex::new(Some(event_rx))),
            subscriptions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn add_service(&self, service: Service) {
        let mut services = self.services.lock().unwrap();
        services.retain(|s| s.id != service.id);
        services.push(service);
    }

    pub fn set_listing_fails(&self, fails: bool) {
        self.fail_listing.store(fails, Ordering::SeqCst);
    }

    /// Store `service` and announce it on the event feed
    pub fn publish(&self, service: Service, action: ServiceAction) {
        let service_id = service.id.clone();
        self.add_service(service);
        let _ = self.event_tx.send(Ok(ServiceEvent { service_id, action }));
    }

    pub fn publish_error(&self) {
        let _ = self
            .event_tx
            .send(Err(Error::discovery("malformed event")));
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn list_services(&self, enable_label: &str) -> Result<Vec<Service>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::http("orchestrator unreachable"));
        }
        Ok(self
            .services
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.labels.get(enable_label).is_some_and(|v| v == "true"))
            .cloned()
            .collect())
    }

    async fn inspect_service(&self, id: &str) -> Result<Service> {
        self.services
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("service {}", id)))
    }

    async fn events(&self) -> Result<ServiceEventStream> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let rx = self
            .event_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::discovery("event feed already taken"))?;
        Ok(Box::pin(
            tokio_stream::wrappers::UnboundedReceiverStream::new(rx),
        ))
    }
}

/// A service opted in with `traefik.enable=true` and one router per FQDN
pub fn enabled_service(id: &str, fqdns: &[&str]) -> Service {
    let mut labels = BTreeMap::new();
    labels.insert("traefik.enable".to_string(), "true".to_string());
    for (i, fqdn) in fqdns.iter().enumerate() {
        labels.insert(
            format!("traefik.http.routers.{}-{}.rule", id, i),
            format!("Host(`{}`)", fqdn),
        );
    }
    Service {
        id: id.to_string(),
        name: format!("stack_{}", id),
        labels,
    }
}

pub fn host(name: &str) -> Hostname {
    Hostname::new(name).expect("valid hostname")
}

pub fn ip(octets: [u8; 4]) -> IpAddr {
    IpAddr::from(octets)
}

/// Configuration with timers long enough not to fire during a test
pub fn test_config() -> SyncConfig {
    let mut config = SyncConfig::new(
        APEX,
        ProviderConfig::Cloudflare {
            api_token: "test-token".to_string(),
            zone_id: "test-zone".to_string(),
        },
    );
    config.engine = EngineConfig {
        reconcile_interval_secs: 3600,
        ip_poll_interval_secs: 3600,
        resubscribe_delay_secs: 1,
        event_channel_capacity: 1000,
    };
    config
}

/// Let spawned tasks make progress
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
