//! Core sync engine
//!
//! The SyncEngine is responsible for:
//! - Running discovery and reconciling every hostname on a timer
//! - Polling the public IP and re-running a full pass when it changes
//! - Reconciling the hostnames of individual services as their events arrive
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  ┌──────────┐  ┌────────────────┐
//! │  Timer   │  │ IP poll  │  │ Service events │
//! └──────────┘  └──────────┘  └────────────────┘
//!      │ full pass    │ full pass       │ single service
//!      └──────────────┼─────────────────┘
//!                     ▼
//!              ┌──────────────┐     ┌──────────────┐
//!              │  SyncEngine  │────▶│HostnameSource│
//!              └──────────────┘     └──────────────┘
//!                     │
//!                     ▼
//!              ┌──────────────┐     ┌──────────────┐
//!              │  Reconciler  │────▶│ DnsProvider  │
//!              └──────────────┘     └──────────────┘
//! ```
//!
//! ## Overlapping triggers
//!
//! Each trigger source runs on its own task. Full passes are coalesced: while
//! one runs, further full-pass requests collapse into a single follow-up pass.
//! Event-driven reconciliation may overlap a full pass; the reconciler
//! serializes work per hostname, so the two cannot both create a record.

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::hostname::Hostname;
use crate::observer::{IpObservation, IpObserver};
use crate::reconciler::{Outcome, Reconciler};
use crate::traits::{DnsProvider, HostnameSource, HostnameUpdate, IpSource};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

/// What caused a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Initial pass when the engine starts
    Startup,
    /// Periodic reconcile timer
    Timer,
    /// The public IP changed
    IpChange,
    /// An orchestrator service was created or updated
    ServiceEvent,
}

/// Counts of per-hostname outcomes in one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Hostnames the pass covered
    pub discovered: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl PassSummary {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated { .. } => self.updated += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started { source: String },

    /// A pass began
    PassStarted { trigger: Trigger },

    /// A pass finished
    PassCompleted {
        trigger: Trigger,
        summary: PassSummary,
    },

    /// A pass could not reconcile anything
    PassSkipped { trigger: Trigger, reason: String },

    /// Discovery failed; the pass was aborted
    DiscoveryFailed { trigger: Trigger, error: String },

    /// First or changed public IP observation
    IpChanged {
        previous: Option<IpAddr>,
        current: IpAddr,
    },

    /// One hostname was reconciled
    RecordReconciled { hostname: Hostname, outcome: Outcome },

    /// Engine stopped
    Stopped { reason: String },
}

/// Core sync engine
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Start with [`SyncEngine::run()`] or [`SyncEngine::run_with_shutdown()`]
/// 3. The engine runs an initial pass, then serves its triggers until shutdown
///
/// ## Shared state
///
/// The held public IP (inside the [`IpObserver`]) and the set of known
/// hostnames are the only mutable state, both behind async locks.
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    /// Discovery strategy
    source: Box<dyn HostnameSource>,

    /// Per-hostname record convergence
    reconciler: Reconciler,

    /// Public IP tracking
    observer: IpObserver,

    /// Hostnames from the last full discovery plus later service events
    ///
    /// Reported through `known_hostnames()`; passes always reconcile what
    /// discovery returns.
    known: RwLock<BTreeSet<Hostname>>,

    /// Held while a full pass runs
    pass_lock: Mutex<()>,

    /// Set when a full pass has been asked for and not yet started
    pass_requested: AtomicBool,

    reconcile_interval: Duration,
    ip_poll_interval: Duration,
    resubscribe_delay: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new sync engine
    ///
    /// # Parameters
    ///
    /// - `source`: Hostname discovery strategy
    /// - `provider`: DNS provider implementation
    /// - `ip_source`: Public IP lookup
    /// - `config`: hostsync configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        source: Box<dyn HostnameSource>,
        provider: Arc<dyn DnsProvider>,
        ip_source: Box<dyn IpSource>,
        config: &SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let inner = EngineInner {
            source,
            reconciler: Reconciler::new(provider, config.apex_domain.clone()),
            observer: IpObserver::new(ip_source),
            known: RwLock::new(BTreeSet::new()),
            pass_lock: Mutex::new(()),
            pass_requested: AtomicBool::new(false),
            reconcile_interval: Duration::from_secs(config.engine.reconcile_interval_secs),
            ip_poll_interval: Duration::from_secs(config.engine.ip_poll_interval_secs),
            resubscribe_delay: Duration::from_secs(config.engine.resubscribe_delay_secs),
            event_tx: tx,
        };

        Ok((
            Self {
                inner: Arc::new(inner),
            },
            rx,
        ))
    }

    /// Run the engine until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        self.run_with_shutdown(None).await
    }

    /// Run the engine until `shutdown_rx` fires (or Ctrl-C when `None`)
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: The startup pass hit an error that leaves nothing to run
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        let inner = &self.inner;

        inner.emit_event(EngineEvent::Started {
            source: inner.source.source_name().to_string(),
        });
        info!(
            "Starting sync engine (discovery: {}, apex: {})",
            inner.source.source_name(),
            inner.reconciler.apex_domain()
        );

        // The first successful observation is the baseline and drives the startup pass
        if let Err(e) = inner.poll_ip().await {
            warn!("No public IP at startup, records wait for the first lookup: {}", e);
        }

        if let Err(e) = inner.run_full_pass(Trigger::Startup).await {
            let startup_fatal =
                matches!(e, Error::Discovery(_)) && inner.source.startup_discovery_required();
            if startup_fatal || e.is_fatal() {
                error!("Startup pass failed: {}", e);
                inner.emit_event(EngineEvent::Stopped {
                    reason: format!("Startup failure: {}", e),
                });
                return Err(e);
            }
            warn!("Startup pass incomplete, continuing: {}", e);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(timer_loop(Arc::clone(inner), stop_rx.clone())),
            tokio::spawn(ip_poll_loop(Arc::clone(inner), stop_rx.clone())),
            tokio::spawn(event_loop(Arc::clone(inner), stop_rx)),
        ];

        match shutdown_rx {
            Some(rx) => {
                let _ = rx.await;
            }
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                }
            }
        }

        info!("Shutdown signal received");
        let _ = stop_tx.send(true);
        join_all(tasks).await;

        inner.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
        info!("Sync engine stopped");

        Ok(())
    }

    /// Run one full discovery + reconcile pass now, bypassing coalescing
    pub async fn run_full_pass(&self, trigger: Trigger) -> Result<PassSummary> {
        self.inner.run_full_pass(trigger).await
    }

    /// Request a full pass, merging with one that is already running
    pub async fn request_full_pass(&self, trigger: Trigger) {
        self.inner.request_full_pass(trigger).await
    }

    /// Reconcile only the hostnames of one changed service
    pub async fn apply_update(&self, update: HostnameUpdate) -> Result<PassSummary> {
        self.inner.apply_update(update).await
    }

    /// Look up the public IP; a change (or first sighting) starts a full pass
    pub async fn check_ip(&self) -> Result<IpObservation> {
        let observation = self.inner.poll_ip().await?;
        if observation.triggers_pass() {
            self.inner.request_full_pass(Trigger::IpChange).await;
        }
        Ok(observation)
    }

    /// Hostnames currently known to the engine
    pub async fn known_hostnames(&self) -> BTreeSet<Hostname> {
        self.inner.known.read().await.clone()
    }

    /// The held public IP
    pub async fn current_ip(&self) -> Option<IpAddr> {
        self.inner.observer.current().await
    }
}

impl EngineInner {
    /// Look up the IP and emit an event when it is new or different
    async fn poll_ip(&self) -> Result<IpObservation> {
        let observation = self.observer.observe().await?;

        match observation {
            IpObservation::Baseline(current) => self.emit_event(EngineEvent::IpChanged {
                previous: None,
                current,
            }),
            IpObservation::Changed { previous, current } => {
                self.emit_event(EngineEvent::IpChanged {
                    previous: Some(previous),
                    current,
                })
            }
            IpObservation::Unchanged(_) => {}
        }

        Ok(observation)
    }

    /// The held IP, looking it up if there has never been a successful lookup
    ///
    /// A held IP is reported as `Unchanged`; a lookup made here may be the
    /// `Baseline`.
    async fn ip_for_pass(&self, trigger: Trigger) -> Result<IpObservation> {
        if let Some(ip) = self.observer.current().await {
            return Ok(IpObservation::Unchanged(ip));
        }

        match self.poll_ip().await {
            Ok(observation) => Ok(observation),
            Err(e) => {
                self.emit_event(EngineEvent::PassSkipped {
                    trigger,
                    reason: format!("No public IP: {}", e),
                });
                Err(e)
            }
        }
    }

    async fn request_full_pass(&self, trigger: Trigger) {
        self.pass_requested.store(true, Ordering::SeqCst);

        loop {
            let Ok(guard) = self.pass_lock.try_lock() else {
                debug!("Full pass already running, {:?} trigger merged into it", trigger);
                return;
            };

            while self.pass_requested.swap(false, Ordering::SeqCst) {
                if let Err(e) = self.run_full_pass(trigger).await {
                    warn!("{:?} pass aborted: {}", trigger, e);
                }
            }

            drop(guard);

            // A request may have landed between the last swap and the unlock
            if !self.pass_requested.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    async fn run_full_pass(&self, trigger: Trigger) -> Result<PassSummary> {
        self.emit_event(EngineEvent::PassStarted { trigger });
        debug!("{:?} pass started", trigger);

        let hostnames = match self.source.discover().await {
            Ok(hostnames) => hostnames,
            Err(e) => {
                error!("Discovery via {} failed: {}", self.source.source_name(), e);
                self.emit_event(EngineEvent::DiscoveryFailed {
                    trigger,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        *self.known.write().await = hostnames.clone();

        let ip = self.ip_for_pass(trigger).await?.current();
        let summary = self.reconcile_set(&hostnames, ip).await;

        info!(
            "{:?} pass complete: {} hostname(s), {} created, {} updated, {} unchanged, {} failed",
            trigger,
            summary.discovered,
            summary.created,
            summary.updated,
            summary.unchanged,
            summary.failed
        );
        self.emit_event(EngineEvent::PassCompleted { trigger, summary });

        Ok(summary)
    }

    async fn apply_update(&self, update: HostnameUpdate) -> Result<PassSummary> {
        let trigger = Trigger::ServiceEvent;
        self.emit_event(EngineEvent::PassStarted { trigger });
        debug!(
            "Service {} contributes {} hostname(s)",
            update.origin,
            update.hostnames.len()
        );

        self.known
            .write()
            .await
            .extend(update.hostnames.iter().cloned());

        let observation = self.ip_for_pass(trigger).await?;
        let summary = self
            .reconcile_set(&update.hostnames, observation.current())
            .await;
        self.emit_event(EngineEvent::PassCompleted { trigger, summary });

        // The event consumed the first sighting; the other hostnames still need it
        if observation.triggers_pass() {
            info!("First public IP observed during a service event, running a full pass");
            self.request_full_pass(Trigger::IpChange).await;
        }

        Ok(summary)
    }

    async fn reconcile_set(&self, hostnames: &BTreeSet<Hostname>, ip: IpAddr) -> PassSummary {
        let mut summary = PassSummary {
            discovered: hostnames.len(),
            ..PassSummary::default()
        };

        for (hostname, outcome) in self.reconciler.reconcile_all(hostnames, ip).await {
            summary.record(&outcome);
            self.emit_event(EngineEvent::RecordReconciled { hostname, outcome });
        }

        summary
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        // Send event, logging warning if channel is full (backpressure)
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

/// Full pass on every reconcile tick
async fn timer_loop(inner: Arc<EngineInner>, mut stop: watch::Receiver<bool>) {
    let period = inner.reconcile_interval;
    let mut ticks = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticks.tick() => inner.request_full_pass(Trigger::Timer).await,
        }
    }
}

/// Full pass whenever the public IP changes
async fn ip_poll_loop(inner: Arc<EngineInner>, mut stop: watch::Receiver<bool>) {
    let period = inner.ip_poll_interval;
    let mut ticks = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticks.tick() => {
                // Lookup failures are logged by the observer; the held IP stays
                if let Ok(observation) = inner.poll_ip().await
                    && observation.triggers_pass()
                {
                    inner.request_full_pass(Trigger::IpChange).await;
                }
            }
        }
    }
}

/// Incremental reconciliation from the discovery source's event stream
async fn event_loop(inner: Arc<EngineInner>, mut stop: watch::Receiver<bool>) {
    loop {
        let subscription = tokio::select! {
            _ = stop.changed() => return,
            subscription = inner.source.watch() => subscription,
        };

        match subscription {
            Ok(Some(mut updates)) => {
                info!("Subscribed to {} service events", inner.source.source_name());
                loop {
                    tokio::select! {
                        _ = stop.changed() => return,
                        next = updates.next() => match next {
                            Some(update) => {
                                if let Err(e) = inner.apply_update(update).await {
                                    warn!("Service event reconciliation skipped: {}", e);
                                }
                            }
                            None => break,
                        },
                    }
                }
                warn!("Service event subscription ended, resubscribing");
            }
            Ok(None) => {
                debug!("{} has no event stream", inner.source.source_name());
                return;
            }
            Err(e) => {
                warn!("Failed to subscribe to service events: {}", e);
            }
        }

        tokio::select! {
            _ = stop.changed() => return,
            _ = tokio::time::sleep(inner.resubscribe_delay) => {}
        }
    }
}

async fn join_all(tasks: Vec<JoinHandle<()>>) {
    for task in tasks {
        if let Err(e) = task.await {
            error!("Trigger task failed: {}", e);
        }
    }
}
