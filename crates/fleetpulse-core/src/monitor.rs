// ── Monitor ──
//
// Full lifecycle management for one device fleet. Loads the inventory,
// runs the periodic probe, reconcile and resolve tasks, and orchestrates
// reboots: optimistic transition, background dispatch, rollback on refusal,
// follow-up probes and the control safety valve.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fleetpulse_api::{BackendClient, TcpProber, TlsMode, TransportConfig};

use crate::config::{MonitorConfig, TlsVerification};
use crate::error::CoreError;
use crate::event::MonitorEvent;
use crate::model::Device;
use crate::probe::{ProbeEffect, apply_probe};
use crate::reboot::{self, ProbeOutcome, RebootEvent, RebootThresholds, Step};
use crate::resolve::{ResolveMode, Resolution, apply_resolution};
use crate::source::{RebootReceipt, Services};
use crate::store::{DeviceRegistry, MergeReport};
use crate::stream::DeviceStream;

const EVENT_CHANNEL_SIZE: usize = 256;

// ── Clock ────────────────────────────────────────────────────────

/// Wall-clock time that advances with the Tokio clock.
///
/// Anchored once when the monitor is built. Every later reading adds the
/// monotonic time elapsed since the anchor, so reboot timing follows a
/// paused or advanced runtime clock.
#[derive(Debug, Clone, Copy)]
struct Clock {
    wall: DateTime<Utc>,
    anchor: Instant,
}

impl Clock {
    fn start() -> Self {
        Self {
            wall: Utc::now(),
            anchor: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}

// ── MonitorState ─────────────────────────────────────────────────

/// Lifecycle state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Bootstrapping,
    Running,
    /// The inventory could not be loaded. No background work runs.
    Failed,
}

// ── RebootTicket ─────────────────────────────────────────────────

/// Handle to an accepted reboot request.
///
/// The device is already marked rebooting when the ticket is issued; the
/// command itself is dispatched in the background. Dropping the ticket does
/// not cancel anything.
#[derive(Debug)]
pub struct RebootTicket {
    address: String,
    initiated_at: DateTime<Utc>,
    outcome: oneshot::Receiver<Result<RebootReceipt, CoreError>>,
}

impl RebootTicket {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn initiated_at(&self) -> DateTime<Utc> {
        self.initiated_at
    }

    /// Wait for the executor's answer.
    pub async fn wait(self) -> Result<RebootReceipt, CoreError> {
        self.outcome
            .await
            .map_err(|_| CoreError::Internal("reboot dispatch ended without an outcome".into()))?
    }
}

// ── Monitor ──────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<MonitorInner>`. A monitor that has been shut
/// down cannot be started again.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    config: MonitorConfig,
    services: Services,
    registry: Arc<DeviceRegistry>,
    state: watch::Sender<MonitorState>,
    events: broadcast::Sender<MonitorEvent>,
    /// Addresses whose reboot control is disabled, with the session that
    /// disabled it.
    locked_controls: DashMap<String, DateTime<Utc>>,
    clock: Clock,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Monitor {
    /// Create a monitor backed by the HTTP backend and TCP probing.
    /// Does not load anything; call [`start()`](Self::start).
    pub fn new(config: MonitorConfig) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            tls: tls_to_transport(&config.tls),
            timeout: config.timeout,
            api_key: config.api_key.clone(),
        };
        let backend = BackendClient::new(config.backend_url.clone(), &transport)?;
        let prober = TcpProber::new(config.probe_ports.clone(), config.probe_connect_timeout)
            .with_budget(config.schedule.probe_timeout);
        Self::with_services(config, Services::from_backend(backend, prober))
    }

    /// Create a monitor over arbitrary collaborators.
    pub fn with_services(config: MonitorConfig, services: Services) -> Result<Self, CoreError> {
        config.validate()?;
        let (state, _) = watch::channel(MonitorState::Stopped);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        Ok(Self {
            inner: Arc::new(MonitorInner {
                config,
                services,
                registry: Arc::new(DeviceRegistry::new()),
                state,
                events,
                locked_controls: DashMap::new(),
                clock: Clock::start(),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Load the inventory, resolve every address, then spawn the periodic
    /// tasks. The first probe round runs immediately.
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::Internal("monitor has been shut down".into()));
        }
        self.bootstrap().await?;

        let schedule = &self.inner.config.schedule;
        let mut handles = self.inner.task_handles.lock().await;

        if !schedule.probe_interval.is_zero() {
            let cancel = self.inner.cancel.clone();
            handles.push(tokio::spawn(probe_task(
                self.clone(),
                schedule.probe_interval,
                cancel,
            )));
        }
        if !schedule.reconcile_interval.is_zero() {
            let cancel = self.inner.cancel.clone();
            handles.push(tokio::spawn(reconcile_task(
                self.clone(),
                schedule.reconcile_interval,
                cancel,
            )));
        }
        if !schedule.resolve_interval.is_zero() {
            let cancel = self.inner.cancel.clone();
            handles.push(tokio::spawn(resolve_task(
                self.clone(),
                schedule.resolve_interval,
                cancel,
            )));
        }

        info!(devices = self.inner.registry.len(), "monitor started");
        Ok(())
    }

    /// Load the inventory and run the initial resolution pass, without
    /// spawning any periodic work.
    ///
    /// A failure here is fatal for the session: the registry stays empty
    /// and `MonitorEvent::BootstrapFailed` is broadcast.
    pub async fn bootstrap(&self) -> Result<(), CoreError> {
        self.inner.state.send_replace(MonitorState::Bootstrapping);

        let upstream = match self.inner.services.source.list_devices().await {
            Ok(list) => list,
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "could not load device list");
                self.inner.state.send_replace(MonitorState::Failed);
                self.emit(MonitorEvent::BootstrapFailed {
                    message: message.clone(),
                });
                return Err(CoreError::BootstrapFailed { message });
            }
        };

        let report = self.inner.registry.upsert_from_upstream(&upstream);
        info!(devices = self.inner.registry.len(), "device list loaded");
        if !report.added.is_empty() {
            self.emit(MonitorEvent::DevicesAdded {
                addresses: report.added,
            });
        }

        let resolved = self.resolve_all(ResolveMode::Initial).await;
        debug!(resolved, "initial resolution complete");

        self.inner.state.send_replace(MonitorState::Running);
        Ok(())
    }

    /// Stop all background tasks.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        self.inner.state.send_replace(MonitorState::Stopped);
        debug!("monitor stopped");
    }

    /// One-shot: load, run closure, shut down.
    ///
    /// Periodic tasks are never spawned; the closure drives whatever work it
    /// needs (`probe_all`, `initiate`, ...).
    pub async fn oneshot<F, Fut, T>(config: MonitorConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Monitor) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let monitor = Monitor::new(config)?;
        monitor.bootstrap().await?;
        let result = f(monitor.clone()).await;
        monitor.shutdown().await;
        result
    }

    // ── Probing ──────────────────────────────────────────────────

    /// Probe every device concurrently and apply each result as it
    /// arrives. Returns the number of devices probed.
    pub async fn probe_all(&self) -> usize {
        let devices = self.inner.registry.all();
        let timeout = self.inner.config.schedule.probe_timeout;

        let mut pending: FuturesUnordered<_> = devices
            .iter()
            .map(|device| {
                let prober = Arc::clone(&self.inner.services.prober);
                let device = Arc::clone(device);
                async move {
                    let outcome = tokio::time::timeout(timeout, prober.probe(&device))
                        .await
                        .unwrap_or(ProbeOutcome::Unreachable);
                    (device, outcome)
                }
            })
            .collect();

        let mut probed = 0;
        while let Some((device, outcome)) = pending.next().await {
            if self.record_probe(&device.address, outcome).is_some() {
                probed += 1;
            }
        }
        probed
    }

    /// Probe a single device now.
    pub async fn probe_device(&self, address: &str) -> Result<ProbeEffect, CoreError> {
        let device = self
            .inner
            .registry
            .get(address)
            .ok_or_else(|| CoreError::DeviceNotFound {
                address: address.to_owned(),
            })?;
        let outcome = tokio::time::timeout(
            self.inner.config.schedule.probe_timeout,
            self.inner.services.prober.probe(&device),
        )
        .await
        .unwrap_or(ProbeOutcome::Unreachable);

        self.record_probe(address, outcome)
            .ok_or_else(|| CoreError::DeviceNotFound {
                address: address.to_owned(),
            })
    }

    /// Apply one probe result under the device's entry lock, then log and
    /// broadcast what it did.
    fn record_probe(&self, address: &str, outcome: ProbeOutcome) -> Option<ProbeEffect> {
        let now = self.inner.clock.now();
        let policy = &self.inner.config.thresholds;
        let effect = self.inner.registry.update(address, |device| {
            let thresholds = *policy.for_tech(&device.tech);
            apply_probe(device, outcome, now, &thresholds)
        })?;

        match effect.step {
            Step::Recovered { elapsed } => {
                info!(address, elapsed_secs = elapsed.as_secs(), "device back online after reboot");
                self.emit(MonitorEvent::RebootRecovered {
                    address: address.to_owned(),
                    elapsed,
                });
                self.release_control(address);
            }
            Step::Stalled { elapsed } => {
                warn!(address, elapsed_secs = elapsed.as_secs(), "device did not come back after reboot");
                self.emit(MonitorEvent::RebootStalled {
                    address: address.to_owned(),
                    elapsed,
                });
                self.release_control(address);
            }
            Step::TooEarly { elapsed } => {
                debug!(address, ?elapsed, "ignoring reachable probe inside minimum downtime");
            }
            _ => {}
        }

        if effect.status_changed() {
            info!(address, from = %effect.previous, to = %effect.current, "status changed");
            self.emit(MonitorEvent::StatusChanged {
                address: address.to_owned(),
                from: effect.previous,
                to: effect.current,
            });
        }
        Some(effect)
    }

    // ── Reconciliation and resolution ────────────────────────────

    /// Merge the current backend inventory into the registry.
    pub async fn reconcile(&self) -> Result<MergeReport, CoreError> {
        let upstream = self.inner.services.source.list_devices().await?;
        let report = self.inner.registry.upsert_from_upstream(&upstream);

        if !report.removed.is_empty() {
            for address in &report.removed {
                self.inner.locked_controls.remove(address);
            }
            info!(count = report.removed.len(), "devices removed upstream");
            self.emit(MonitorEvent::DevicesRemoved {
                addresses: report.removed.clone(),
            });
        }
        if !report.added.is_empty() {
            info!(count = report.added.len(), "devices added upstream");
            self.emit(MonitorEvent::DevicesAdded {
                addresses: report.added.clone(),
            });
            self.resolve_addresses(&report.added, ResolveMode::Initial)
                .await;
        }
        Ok(report)
    }

    /// Resolve every device concurrently. Returns how many addresses changed.
    pub async fn resolve_all(&self, mode: ResolveMode) -> usize {
        let addresses = self.inner.registry.addresses();
        self.resolve_addresses(&addresses, mode).await
    }

    async fn resolve_addresses(&self, addresses: &[String], mode: ResolveMode) -> usize {
        let mut pending: FuturesUnordered<_> = addresses
            .iter()
            .map(|address| {
                let resolver = Arc::clone(&self.inner.services.resolver);
                async move {
                    let result = resolver.resolve(address).await;
                    (address.as_str(), result)
                }
            })
            .collect();

        let mut changed = 0;
        while let Some((address, result)) = pending.next().await {
            if let Err(ref e) = result {
                debug!(address, error = %e, "resolution failed");
            }
            let resolution = Resolution::from_result(result);
            let updated = self.inner.registry.update(address, |device| {
                if apply_resolution(device, resolution, mode) {
                    device.ip
                } else {
                    None
                }
            });
            if let Some(Some(ip)) = updated {
                changed += 1;
                debug!(address, %ip, "address changed");
                self.emit(MonitorEvent::AddressChanged {
                    address: address.to_owned(),
                    ip,
                });
            }
        }
        changed
    }

    // ── Reboot orchestration ─────────────────────────────────────

    /// Request a reboot.
    ///
    /// On acceptance the device is marked rebooting immediately, its reboot
    /// control is disabled, and the command is dispatched in the background.
    /// A second request for a device already rebooting is refused without
    /// contacting the executor.
    ///
    /// The dispatch runs on the current Tokio runtime. Called from outside
    /// one, the request is refused before the device is touched.
    pub fn initiate(&self, address: &str) -> Result<RebootTicket, CoreError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(CoreError::NoDeviceSelected);
        }
        let runtime = Handle::try_current()
            .map_err(|e| CoreError::Internal(format!("reboot dispatch needs a Tokio runtime: {e}")))?;

        let now = self.inner.clock.now();
        let policy = &self.inner.config.thresholds;
        let transition = self
            .inner
            .registry
            .update(address, |device| {
                let thresholds = *policy.for_tech(&device.tech);
                let t = reboot::step(device.reboot, RebootEvent::Initiate, now, &thresholds);
                device.reboot = t.next;
                t
            })
            .ok_or_else(|| CoreError::DeviceNotFound {
                address: address.to_owned(),
            })?;

        if transition.step != Step::Entered {
            info!(address, "reboot already in progress, ignoring request");
            return Err(CoreError::RebootInProgress {
                address: address.to_owned(),
            });
        }

        info!(address, "reboot initiated");
        self.inner
            .locked_controls
            .insert(address.to_owned(), now);
        self.emit(MonitorEvent::RebootAccepted {
            address: address.to_owned(),
            at: now,
        });

        let (tx, rx) = oneshot::channel();
        runtime.spawn(dispatch_reboot(self.clone(), address.to_owned(), now, tx));
        runtime.spawn(release_control_after(self.clone(), address.to_owned(), now));

        Ok(RebootTicket {
            address: address.to_owned(),
            initiated_at: now,
            outcome: rx,
        })
    }

    /// Whether an operator may request a reboot of `address` right now.
    pub fn reboot_control_enabled(&self, address: &str) -> bool {
        self.inner.registry.contains(address) && !self.inner.locked_controls.contains_key(address)
    }

    /// Undo the optimistic transition of the session started at
    /// `initiated_at`. Later sessions are left alone.
    fn roll_back(&self, address: &str, initiated_at: DateTime<Utc>, message: String) {
        let policy = &self.inner.config.thresholds;
        let rolled_back = self
            .inner
            .registry
            .update(address, |device| {
                let thresholds = *policy.for_tech(&device.tech);
                let t = reboot::step(
                    device.reboot,
                    RebootEvent::CommandRejected { initiated_at },
                    self.inner.clock.now(),
                    &thresholds,
                );
                device.reboot = t.next;
                t.step == Step::RolledBack
            })
            .unwrap_or(false);
        if !rolled_back {
            debug!(address, "rejected session is no longer current");
        }

        self.inner
            .locked_controls
            .remove_if(address, |_, at| *at == initiated_at);
        self.emit(MonitorEvent::RebootRejected {
            address: address.to_owned(),
            message,
        });
    }

    /// Probe again at each follow-up offset while the session lasts.
    fn schedule_follow_ups(&self, address: String, initiated_at: DateTime<Utc>) {
        let mut offsets = self.inner.config.schedule.follow_ups.clone();
        if offsets.is_empty() {
            return;
        }
        offsets.sort_unstable();

        let monitor = self.clone();
        let cancel = self.inner.cancel.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            for offset in offsets {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep_until(start + offset) => {}
                }
                let current = monitor
                    .inner
                    .registry
                    .get(&address)
                    .is_some_and(|d| d.reboot_initiated_at() == Some(initiated_at));
                if !current {
                    debug!(address, "reboot settled, dropping remaining follow-up probes");
                    return;
                }
                if let Err(e) = monitor.probe_device(&address).await {
                    debug!(address, error = %e, "follow-up probe skipped");
                    return;
                }
            }
        });
    }

    fn release_control(&self, address: &str) {
        if self.inner.locked_controls.remove(address).is_some() {
            self.emit(MonitorEvent::ControlReleased {
                address: address.to_owned(),
                still_rebooting: false,
            });
        }
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to lifecycle state changes.
    pub fn state(&self) -> watch::Receiver<MonitorState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to the event broadcast stream.
    pub fn events(&self) -> broadcast::Receiver<MonitorEvent> {
        self.inner.events.subscribe()
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.inner.registry.all()
    }

    pub fn get(&self, address: &str) -> Option<Device> {
        self.inner.registry.get(address)
    }

    pub fn devices(&self) -> DeviceStream {
        DeviceStream::new(self.inner.registry.subscribe())
    }

    /// Current time as the monitor sees it. Reboot timestamps and
    /// `last_seen` are taken from this clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Reboot thresholds that apply to `device`.
    pub fn thresholds_for(&self, device: &Device) -> RebootThresholds {
        *self.inner.config.thresholds.for_tech(&device.tech)
    }

    fn emit(&self, event: MonitorEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

// ── Reboot background work ───────────────────────────────────────

async fn dispatch_reboot(
    monitor: Monitor,
    address: String,
    initiated_at: DateTime<Utc>,
    reply: oneshot::Sender<Result<RebootReceipt, CoreError>>,
) {
    let result = monitor.inner.services.executor.reboot(&address).await;
    match &result {
        Ok(receipt) => {
            info!(address, "reboot command delivered");
            monitor.emit(MonitorEvent::RebootDispatched {
                address: address.clone(),
                output: receipt.output.clone(),
            });
            monitor.schedule_follow_ups(address, initiated_at);
        }
        Err(e) => {
            warn!(address, error = %e, "reboot command failed, rolling back");
            monitor.roll_back(&address, initiated_at, e.to_string());
        }
    }
    let _ = reply.send(result);
}

/// Safety valve: re-enable the control once the release delay passes,
/// whatever the device is doing.
async fn release_control_after(monitor: Monitor, address: String, initiated_at: DateTime<Utc>) {
    let delay = monitor.inner.config.schedule.control_release;
    tokio::select! {
        biased;
        () = monitor.inner.cancel.cancelled() => return,
        () = tokio::time::sleep(delay) => {}
    }

    let released = monitor
        .inner
        .locked_controls
        .remove_if(&address, |_, at| *at == initiated_at)
        .is_some();
    if !released {
        return;
    }

    let still_rebooting = monitor
        .inner
        .registry
        .get(&address)
        .is_some_and(|d| d.reboot_initiated_at() == Some(initiated_at));
    if still_rebooting {
        warn!(address, "reboot is taking longer than expected, control re-enabled");
    } else {
        debug!(address, "reboot control re-enabled");
    }
    monitor.emit(MonitorEvent::ControlReleased {
        address,
        still_rebooting,
    });
}

// ── Periodic tasks ───────────────────────────────────────────────

/// Probe every device on a fixed cadence, starting immediately.
async fn probe_task(monitor: Monitor, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let probed = monitor.probe_all().await;
                debug!(probed, "probe round complete");
            }
        }
    }
}

async fn reconcile_task(monitor: Monitor, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                // The next cycle retries; keep the current set.
                if let Err(e) = monitor.reconcile().await {
                    debug!(error = %e, "reconcile skipped");
                }
            }
        }
    }
}

async fn resolve_task(monitor: Monitor, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let changed = monitor.resolve_all(ResolveMode::Periodic).await;
                debug!(changed, "periodic resolution complete");
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}
