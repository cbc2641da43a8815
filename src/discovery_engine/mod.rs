//! DiscoveryEngine - LAN camera discovery
//!
//! ## Responsibilities
//!
//! - Vendor UDP broadcast query (search + device info)
//! - WS-Discovery / SSDP listening, resolved through DeviceResolver
//! - Ordered TCP sweep over a CIDR range with per-port cancellation
//! - Deduplicated device events and monotonic progress
//!
//! ## Phases
//!
//! ```text
//! validate range → 5% → vendor broadcast → passive (WS-Discovery ∥ SSDP)
//!     → host sweep (progress per host) → Complete
//! ```
//!
//! A run never emits two devices with the same IP, and never reports a host
//! that already belongs to a configured camera.

mod cidr;
mod types;

pub use cidr::{enumerate_hosts, MAX_SCAN_HOSTS};
pub use types::*;

use std::collections::{BTreeSet, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

use crate::camera_registry::{host_of, Credentials};
use crate::device_resolver::{DeviceResolver, ResolverConfig, VENDOR_MANUFACTURER};
use crate::error::{Error, Result};
use crate::network_probe::{Transport, VENDOR_UDP_PORTS};
use crate::wire_protocol::{extract_device_info, query, PassiveProtocol};

/// Default TCP ports probed per host
pub const DEFAULT_SCAN_PORTS: [u16; 7] = [80, 443, 554, 8000, 8080, 8554, 9000];

/// Ports assumed for hosts found by passive discovery
pub const PASSIVE_CANDIDATE_PORTS: [u16; 4] = [80, 554, 8000, 8554];

/// Progress reported once the range is validated
const INITIAL_PROGRESS: u8 = 5;

/// Scan configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub ports: Vec<u16>,
    pub tcp_timeout: Duration,
    /// Idle window for vendor UDP replies
    pub udp_window: Duration,
    /// Listening window for WS-Discovery / SSDP
    pub passive_window: Duration,
    pub broadcast_addr: IpAddr,
    pub event_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ports: DEFAULT_SCAN_PORTS.to_vec(),
            tcp_timeout: Duration::from_millis(300),
            udp_window: Duration::from_millis(1500),
            passive_window: Duration::from_millis(1500),
            broadcast_addr: IpAddr::V4(Ipv4Addr::BROADCAST),
            event_capacity: 256,
        }
    }
}

/// Discovery engine; one run at a time
pub struct DiscoveryEngine {
    transport: Arc<dyn Transport>,
    resolver: DeviceResolver,
    config: ScanConfig,
    state: watch::Sender<EngineState>,
    running: AtomicBool,
    cancel: Arc<AtomicBool>,
    events: broadcast::Sender<DiscoveryEvent>,
}

/// Clears the running flag when a run ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl DiscoveryEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: ScanConfig,
        resolver_config: ResolverConfig,
    ) -> Result<Self> {
        let resolver = DeviceResolver::new(Arc::clone(&transport), resolver_config)?;
        let (state, _) = watch::channel(EngineState::Idle);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Ok(Self {
            transport,
            resolver,
            config,
            state,
            running: AtomicBool::new(false),
            cancel: Arc::new(AtomicBool::new(false)),
            events,
        })
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.events.subscribe()
    }

    /// Request cancellation of the current run
    pub fn cancel(&self) {
        if self.running.load(Ordering::SeqCst) {
            tracing::info!("Scan cancellation requested");
        }
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Flag that cancels the current run when set (for other tasks / signal handlers)
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn emit(&self, event: DiscoveryEvent) {
        let _ = self.events.send(event);
    }

    /// Run a full scan
    ///
    /// Fails with `Validation` for a bad range and `Conflict` when a run is
    /// already in progress; everything else is reported through the summary.
    pub async fn run(&self, request: ScanRequest) -> Result<ScanSummary> {
        let hosts = enumerate_hosts(&request.range)?;

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::Conflict("a scan is already running".to_string()));
        }
        let _guard = RunGuard(&self.running);
        self.cancel.store(false, Ordering::SeqCst);
        self.state.send_replace(EngineState::Running);

        tracing::info!(range = %request.range, hosts = hosts.len(), "Scan started");

        let mut run = ScanRun::new(&request, hosts.len());
        run.progress(self, INITIAL_PROGRESS, &request.range);

        self.vendor_broadcast(&mut run).await;
        if !self.is_cancelled() {
            self.passive_discovery(&mut run, &request.credentials).await;
        }
        if !self.is_cancelled() {
            self.sweep(&mut run, &hosts, &request.credentials).await;
        }

        let cancelled = self.is_cancelled();
        let count = run.devices.len();
        self.state.send_replace(if cancelled {
            EngineState::Cancelled
        } else {
            EngineState::Completed
        });
        self.emit(DiscoveryEvent::Complete { count, cancelled });

        tracing::info!(
            devices = count,
            hosts_checked = run.hosts_checked,
            hosts_total = run.hosts_total,
            cancelled = cancelled,
            "Scan finished"
        );

        Ok(ScanSummary {
            devices: run.devices,
            hosts_checked: run.hosts_checked,
            hosts_total: run.hosts_total,
            cancelled,
        })
    }

    async fn vendor_broadcast(&self, run: &mut ScanRun) {
        let queries = [query::search(None), query::device_info()];
        let responses = self
            .transport
            .udp_broadcast(
                self.config.broadcast_addr,
                &VENDOR_UDP_PORTS,
                &queries,
                self.config.udp_window,
            )
            .await;

        tracing::debug!(responders = responses.len(), "Vendor broadcast finished");

        for response in responses {
            let ip = response.from.ip();
            let device = match extract_device_info(&response.message.payload) {
                Some(info) => DiscoveredDevice::from_identity(
                    ip,
                    info.into_identity(),
                    VENDOR_MANUFACTURER,
                    DiscoverySource::VendorBroadcast,
                ),
                None => {
                    let mut device = DiscoveredDevice::new(ip, DiscoverySource::VendorBroadcast);
                    device.manufacturer = Some(VENDOR_MANUFACTURER.to_string());
                    device
                }
            };
            run.emit_device(self, device);
        }
    }

    async fn passive_discovery(&self, run: &mut ScanRun, credentials: &Credentials) {
        let window = self.config.passive_window;
        let (ws, ssdp) = futures::join!(
            self.transport.passive_discover(PassiveProtocol::WsDiscovery, window),
            self.transport.passive_discover(PassiveProtocol::Ssdp, window),
        );

        let candidates: BTreeSet<u16> = PASSIVE_CANDIDATE_PORTS.into_iter().collect();
        let found = ws
            .into_iter()
            .map(|ip| (ip, DiscoverySource::WsDiscovery))
            .chain(ssdp.into_iter().map(|ip| (ip, DiscoverySource::Ssdp)));

        for (ip, source) in found {
            if self.is_cancelled() {
                return;
            }
            if run.is_known(&ip) {
                continue;
            }
            if let Some(device) = self.resolver.resolve(ip, &candidates, credentials).await {
                run.emit_device(self, device.with_source(source));
            }
        }
    }

    async fn sweep(&self, run: &mut ScanRun, hosts: &[IpAddr], credentials: &Credentials) {
        for host in hosts {
            if self.is_cancelled() {
                return;
            }

            if !run.is_known(host) {
                let mut open_ports = BTreeSet::new();
                for port in &self.config.ports {
                    if self.is_cancelled() {
                        return;
                    }
                    let outcome = self
                        .transport
                        .tcp_probe(SocketAddr::new(*host, *port), self.config.tcp_timeout)
                        .await;
                    if outcome.is_open() {
                        open_ports.insert(*port);
                    }
                }

                if !open_ports.is_empty() {
                    tracing::debug!(ip = %host, ports = ?open_ports, "Open ports found");
                    if let Some(device) = self.resolver.resolve(*host, &open_ports, credentials).await {
                        run.emit_device(self, device.with_source(DiscoverySource::AddressSweep));
                    }
                }
            }

            run.hosts_checked += 1;
            let percent = (run.hosts_checked * 100 / run.hosts_total.max(1)) as u8;
            run.progress(self, percent, &host.to_string());
        }
    }
}

/// Per-run state; discarded when the run ends
struct ScanRun {
    known: HashSet<IpAddr>,
    devices: Vec<DiscoveredDevice>,
    hosts_checked: usize,
    hosts_total: usize,
    last_percent: u8,
}

impl ScanRun {
    fn new(request: &ScanRequest, hosts_total: usize) -> Self {
        let known = request
            .known_urls
            .iter()
            .filter_map(|url| host_of(url))
            .filter_map(|host| host.parse::<IpAddr>().ok())
            .collect();
        Self {
            known,
            devices: Vec::new(),
            hosts_checked: 0,
            hosts_total,
            last_percent: 0,
        }
    }

    fn is_known(&self, ip: &IpAddr) -> bool {
        self.known.contains(ip)
    }

    fn emit_device(&mut self, engine: &DiscoveryEngine, device: DiscoveredDevice) {
        if !self.known.insert(device.ip) {
            tracing::debug!(ip = %device.ip, source = %device.source, "Skipping known device");
            return;
        }
        tracing::info!(
            ip = %device.ip,
            name = %device.label(),
            source = %device.source,
            "Device found"
        );
        engine.emit(DiscoveryEvent::DeviceFound(device.clone()));
        self.devices.push(device);
    }

    fn progress(&mut self, engine: &DiscoveryEngine, percent: u8, label: &str) {
        let percent = percent.min(100).max(self.last_percent);
        self.last_percent = percent;
        engine.emit(DiscoveryEvent::Progress(ScanProgress {
            percent,
            current_host_label: label.to_string(),
        }));
    }
}

#[cfg(test)]
mod tests;
