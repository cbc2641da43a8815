//! In-memory fakes for the network, capture and recording seams

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::network_probe::{ProbeOutcome, Transport, UdpResponse};
use crate::stream_session::{
    CaptureBackend, CaptureStream, FrameSink, RecordingParams, SinkFactory, StreamInfo, VideoFrame,
};
use crate::wire_protocol::{Endianness, PassiveProtocol, Payload, WireMessage};

/// Vendor reply carrying `identity` under `value.{shape}`
pub(crate) fn vendor_reply(ip: IpAddr, shape: &str, identity: Value) -> UdpResponse {
    let mut value = Map::new();
    value.insert(shape.to_string(), identity);
    let payload = Payload::from_value(json!([{ "cmd": "GetDevInfo", "code": 0, "value": value }]))
        .expect("valid payload");
    UdpResponse {
        from: SocketAddr::new(ip, 9000),
        message: WireMessage::new(Endianness::Little, payload),
    }
}

/// Scripted network; TCP probes to unknown addresses time out
#[derive(Default)]
pub(crate) struct FakeTransport {
    tcp: Mutex<HashMap<SocketAddr, ProbeOutcome>>,
    unicast: Mutex<HashMap<IpAddr, Vec<UdpResponse>>>,
    broadcast: Mutex<Vec<UdpResponse>>,
    passive: Mutex<HashMap<PassiveProtocol, Vec<IpAddr>>>,
    probes: Mutex<Vec<SocketAddr>>,
    wakes: Mutex<Vec<(IpAddr, Option<String>)>>,
    udp_targets: Mutex<Vec<IpAddr>>,
    broadcasts: Mutex<Vec<IpAddr>>,
    cancel_after: Mutex<Option<(usize, Arc<AtomicBool>)>>,
    probe_delay: Mutex<Option<Duration>>,
    wake_delay: Mutex<Option<Duration>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tcp(&self, addr: SocketAddr, outcome: ProbeOutcome) {
        self.tcp.lock().unwrap().insert(addr, outcome);
    }

    pub fn open(&self, ip: &str, ports: &[u16]) {
        let ip: IpAddr = ip.parse().expect("valid ip");
        for port in ports {
            self.set_tcp(SocketAddr::new(ip, *port), ProbeOutcome::Ok);
        }
    }

    pub fn unicast_reply(&self, reply: UdpResponse) {
        self.reply_to(reply.from.ip(), reply);
    }

    /// Answer directed queries to `target` with `reply`, whatever its source
    pub fn reply_to(&self, target: IpAddr, reply: UdpResponse) {
        self.unicast.lock().unwrap().entry(target).or_default().push(reply);
    }

    pub fn broadcast_reply(&self, reply: UdpResponse) {
        self.broadcast.lock().unwrap().push(reply);
    }

    pub fn passive(&self, protocol: PassiveProtocol, ips: &[&str]) {
        let ips = ips.iter().map(|ip| ip.parse().expect("valid ip")).collect();
        self.passive.lock().unwrap().insert(protocol, ips);
    }

    /// Raise `flag` once `probes` TCP probes have been made
    pub fn cancel_after(&self, probes: usize, flag: Arc<AtomicBool>) {
        *self.cancel_after.lock().unwrap() = Some((probes, flag));
    }

    /// Make every TCP probe take `delay`
    pub fn slow_probes(&self, delay: Duration) {
        *self.probe_delay.lock().unwrap() = Some(delay);
    }

    pub fn slow_wakes(&self, delay: Duration) {
        *self.wake_delay.lock().unwrap() = Some(delay);
    }

    pub fn probes(&self) -> Vec<SocketAddr> {
        self.probes.lock().unwrap().clone()
    }

    pub fn wakes(&self) -> Vec<(IpAddr, Option<String>)> {
        self.wakes.lock().unwrap().clone()
    }

    pub fn udp_targets(&self) -> Vec<IpAddr> {
        self.udp_targets.lock().unwrap().clone()
    }

    pub fn broadcasts(&self) -> Vec<IpAddr> {
        self.broadcasts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn tcp_probe(&self, addr: SocketAddr, _timeout: Duration) -> ProbeOutcome {
        let count = {
            let mut probes = self.probes.lock().unwrap();
            probes.push(addr);
            probes.len()
        };
        if let Some((limit, flag)) = self.cancel_after.lock().unwrap().as_ref() {
            if count >= *limit {
                flag.store(true, Ordering::SeqCst);
            }
        }
        let delay = *self.probe_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.tcp
            .lock()
            .unwrap()
            .get(&addr)
            .copied()
            .unwrap_or(ProbeOutcome::Timeout)
    }

    async fn udp_query(
        &self,
        target: IpAddr,
        _ports: &[u16],
        _queries: &[Payload],
        _window: Duration,
    ) -> Vec<UdpResponse> {
        self.udp_targets.lock().unwrap().push(target);
        self.unicast
            .lock()
            .unwrap()
            .get(&target)
            .cloned()
            .unwrap_or_default()
    }

    async fn udp_broadcast(
        &self,
        target: IpAddr,
        _ports: &[u16],
        _queries: &[Payload],
        _window: Duration,
    ) -> Vec<UdpResponse> {
        self.broadcasts.lock().unwrap().push(target);
        self.broadcast.lock().unwrap().clone()
    }

    async fn wake_burst(&self, host: IpAddr, uid: Option<&str>, _ports: &[u16]) {
        let delay = *self.wake_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.wakes
            .lock()
            .unwrap()
            .push((host, uid.map(str::to_string)));
    }

    async fn passive_discover(&self, protocol: PassiveProtocol, _window: Duration) -> Vec<IpAddr> {
        self.passive
            .lock()
            .unwrap()
            .get(&protocol)
            .cloned()
            .unwrap_or_default()
    }
}

/// Capture backend that opens URLs ending with an accepted suffix
pub(crate) struct FakeBackend {
    accept_suffixes: Option<Vec<String>>,
    /// Frames each successive capture yields before failing; empty means endless
    frame_plan: Mutex<VecDeque<usize>>,
    opened: Mutex<Vec<(String, Instant)>>,
    info: StreamInfo,
}

impl FakeBackend {
    pub fn accept_all() -> Self {
        Self {
            accept_suffixes: None,
            frame_plan: Mutex::new(VecDeque::new()),
            opened: Mutex::new(Vec::new()),
            info: StreamInfo {
                width: Some(4),
                height: Some(2),
                fps: Some(20.0),
            },
        }
    }

    pub fn accept_only(suffixes: &[&str]) -> Self {
        Self {
            accept_suffixes: Some(suffixes.iter().map(|s| s.to_string()).collect()),
            ..Self::accept_all()
        }
    }

    pub fn reject_all() -> Self {
        Self::accept_only(&[])
    }

    pub fn with_frame_plan(self, plan: &[usize]) -> Self {
        *self.frame_plan.lock().unwrap() = plan.iter().copied().collect();
        self
    }

    /// URLs that opened successfully, in order
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.opened.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl CaptureBackend for FakeBackend {
    async fn open(&self, url: &str) -> Result<Box<dyn CaptureStream>> {
        let accepted = match &self.accept_suffixes {
            None => true,
            Some(suffixes) => suffixes.iter().any(|s| url.ends_with(s.as_str())),
        };
        if !accepted {
            return Err(Error::Capture(format!("cannot open {}", url)));
        }
        self.opened.lock().unwrap().push((url.to_string(), Instant::now()));
        let remaining = self.frame_plan.lock().unwrap().pop_front();
        Ok(Box::new(FakeStream {
            info: self.info,
            remaining,
            sequence: 0,
        }))
    }
}

struct FakeStream {
    info: StreamInfo,
    remaining: Option<usize>,
    sequence: u64,
}

#[async_trait]
impl CaptureStream for FakeStream {
    fn info(&self) -> StreamInfo {
        self.info
    }

    async fn read_frame(&mut self) -> Result<VideoFrame> {
        match self.remaining.as_mut() {
            Some(0) => return Err(Error::Capture("simulated read failure".to_string())),
            Some(n) => *n -= 1,
            None => {}
        }
        self.sequence += 1;
        let width = self.info.width.unwrap_or(4);
        let height = self.info.height.unwrap_or(2);
        Ok(VideoFrame {
            data: Bytes::from(vec![0u8; (width * height * 3) as usize]),
            width,
            height,
            sequence: self.sequence,
        })
    }
}

/// Sink factory counting created sinks, frames and closes
#[derive(Default)]
pub(crate) struct FakeSinkFactory {
    pub created: Mutex<Vec<(PathBuf, RecordingParams)>>,
    pub frames: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    /// Writes fail once this many frames were written
    pub fail_after: Option<usize>,
}

impl FakeSinkFactory {
    pub fn failing_after(frames: usize) -> Self {
        Self {
            fail_after: Some(frames),
            ..Default::default()
        }
    }

    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SinkFactory for FakeSinkFactory {
    async fn create(&self, path: &Path, params: &RecordingParams) -> Result<Box<dyn FrameSink>> {
        self.created
            .lock()
            .unwrap()
            .push((path.to_path_buf(), *params));
        Ok(Box::new(FakeSink {
            written: 0,
            frames: Arc::clone(&self.frames),
            closed: Arc::clone(&self.closed),
            fail_after: self.fail_after,
        }))
    }
}

struct FakeSink {
    written: usize,
    frames: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    fail_after: Option<usize>,
}

#[async_trait]
impl FrameSink for FakeSink {
    async fn write_frame(&mut self, _frame: &VideoFrame) -> Result<()> {
        if self.fail_after.map(|n| self.written >= n).unwrap_or(false) {
            return Err(Error::Recording("disk full".to_string()));
        }
        self.written += 1;
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
