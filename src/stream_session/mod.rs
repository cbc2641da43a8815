//! StreamSession - live connection to one camera
//!
//! ## Responsibilities
//!
//! - Wake sleeping cameras before connecting
//! - Open the configured URL, falling back to vendor-typical stream paths
//! - Frame loop with subscriber fan-out and optional recording
//! - Automatic reconnect until stopped
//!
//! ## State machine
//!
//! ```text
//! Idle → Waking → Connecting → Streaming
//!          ↑           │           │
//!          │           ▼           ▼
//!     Reconnecting ← Failed(kind) ←┘
//!
//! any state → Stopped (explicit stop)
//! ```
//!
//! Only the session's own task moves the state, except `Stopped` on a
//! session that never started.

mod capture;
mod fallback;
mod group;
mod recording;
mod types;
mod wake;

pub use capture::{CaptureBackend, CaptureStream, FfmpegCapture, StreamInfo, VideoFrame};
pub use fallback::{candidate_urls, FALLBACK_PATHS};
pub use group::SessionGroup;
pub use recording::{
    recording_file_name, FfmpegRecorder, FrameSink, RecordingParams, SinkFactory,
    DEFAULT_RECORDING_FPS, DEFAULT_RECORDING_HEIGHT, DEFAULT_RECORDING_WIDTH, MAX_RECORDING_FPS,
    RECORDING_EXTENSION,
};
pub use types::*;

use chrono::{Local, Utc};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use url::{Host, Url};

use crate::camera_registry::{CameraEndpoint, CameraId, DEFAULT_RTSP_PORT};
use crate::error::FailureKind;
use crate::network_probe::{LanTransport, Transport};
use recording::ActiveRecording;

/// Collaborators shared by sessions
#[derive(Clone)]
pub struct SessionDeps {
    pub transport: Arc<dyn Transport>,
    pub capture: Arc<dyn CaptureBackend>,
    pub sinks: Arc<dyn SinkFactory>,
}

impl SessionDeps {
    /// Real network, ffmpeg capture and ffmpeg recording
    pub fn lan(ffmpeg: &str, ffprobe: &str) -> Self {
        Self {
            transport: Arc::new(LanTransport::new()),
            capture: Arc::new(FfmpegCapture::new(ffmpeg, ffprobe)),
            sinks: Arc::new(FfmpegRecorder::new(ffmpeg)),
        }
    }
}

/// Live connection to one camera
pub struct StreamSession {
    inner: Arc<SessionInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct SessionInner {
    id: CameraId,
    endpoint: RwLock<CameraEndpoint>,
    config: SessionConfig,
    deps: SessionDeps,
    state: watch::Sender<ConnectionState>,
    running: watch::Sender<bool>,
    events: broadcast::Sender<SessionEvent>,
    /// `Some` while recording; also the recording flag
    recording: Mutex<Option<ActiveRecording>>,
    /// Geometry of the live capture, `None` when not streaming
    capture_info: RwLock<Option<StreamInfo>>,
}

impl StreamSession {
    pub fn new(endpoint: CameraEndpoint, config: SessionConfig, deps: SessionDeps) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self::with_events(endpoint, config, deps, events)
    }

    /// Session publishing into an existing event channel
    pub fn with_events(
        endpoint: CameraEndpoint,
        config: SessionConfig,
        deps: SessionDeps,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (running, _) = watch::channel(false);
        Self {
            inner: Arc::new(SessionInner {
                id: endpoint.id,
                endpoint: RwLock::new(endpoint),
                config,
                deps,
                state,
                running,
                events,
                recording: Mutex::new(None),
                capture_info: RwLock::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn id(&self) -> CameraId {
        self.inner.id
    }

    /// Endpoint snapshot, including any adopted fallback URL
    pub async fn endpoint(&self) -> CameraEndpoint {
        self.inner.endpoint.read().await.clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Started and not yet stopped
    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// Spawn the session task; returns `false` if already running or stopped
    pub async fn start(&self) -> bool {
        let mut task = self.task.lock().await;
        if task.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return false;
        }
        if self.state() == ConnectionState::Stopped {
            tracing::warn!(camera_id = self.inner.id, "Stopped session cannot be restarted");
            return false;
        }

        self.inner.running.send_replace(true);
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(inner.run()));
        true
    }

    /// Stop the task and wait for it to release the capture and any recording
    pub async fn stop(&self) {
        self.inner.running.send_replace(false);

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(camera_id = self.inner.id, error = %e, "Session task failed");
                self.inner.release_capture(None).await;
            }
        }
        self.inner.set_state(ConnectionState::Stopped);
    }

    /// Start recording into `output_dir`
    ///
    /// Returns `None` when no capture is live or a recording is already active.
    pub async fn start_recording(&self, output_dir: &Path) -> Option<PathBuf> {
        let inner = &self.inner;
        let mut recording = inner.recording.lock().await;

        if recording.is_some() {
            inner.busy("already recording");
            return None;
        }
        let Some(info) = *inner.capture_info.read().await else {
            inner.busy("no live capture");
            return None;
        };

        if let Err(e) = tokio::fs::create_dir_all(output_dir).await {
            tracing::warn!(camera_id = inner.id, dir = %output_dir.display(), error = %e, "Cannot create recording directory");
            return None;
        }

        let params = RecordingParams::from_stream_info(&info);
        let path = output_dir.join(recording_file_name(inner.id, Local::now()));

        match inner.deps.sinks.create(&path, &params).await {
            Ok(sink) => {
                tracing::info!(
                    camera_id = inner.id,
                    path = %path.display(),
                    width = params.width,
                    height = params.height,
                    fps = params.fps,
                    "Recording started"
                );
                *recording = Some(ActiveRecording {
                    sink,
                    path: path.clone(),
                    params,
                    started_at: Utc::now(),
                    frames_written: 0,
                });
                Some(path)
            }
            Err(e) => {
                tracing::warn!(camera_id = inner.id, error = %e, "Failed to start recording");
                None
            }
        }
    }

    /// Stop recording; a no-op returning `None` when nothing is recording
    pub async fn stop_recording(&self) -> Option<PathBuf> {
        let active = self.inner.recording.lock().await.take()?;
        let path = active.path.clone();
        self.inner.finish_recording(active, None).await;
        Some(path)
    }

    pub async fn is_recording(&self) -> bool {
        self.inner.recording.lock().await.is_some()
    }
}

impl SessionInner {
    fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: ConnectionState) {
        let prev = self.state.send_replace(state);
        if prev != state {
            tracing::info!(camera_id = self.id, from = %prev, to = %state, "Session state changed");
            self.emit(SessionEvent::StateChanged {
                session_id: self.id,
                state,
            });
        }
    }

    fn busy(&self, detail: &str) {
        tracing::warn!(
            camera_id = self.id,
            kind = FailureKind::ResourceBusy.as_str(),
            detail = detail,
            "Recording request rejected"
        );
    }

    fn fail(&self, kind: FailureKind, message: String) {
        tracing::warn!(camera_id = self.id, kind = kind.as_str(), message = %message, "Connection failed");
        self.set_state(ConnectionState::Failed(kind));
        self.emit(SessionEvent::Status {
            session_id: self.id,
            connected: false,
            message,
        });
    }

    /// Run `fut` unless the session is stopped first
    async fn until_stopped<F: Future>(&self, fut: F) -> Option<F::Output> {
        let mut running = self.running.subscribe();
        tokio::select! {
            out = fut => Some(out),
            _ = running.wait_for(|r| !*r) => None,
        }
    }

    /// Returns `false` when interrupted by stop
    async fn sleep_unless_stopped(&self, duration: Duration) -> bool {
        self.until_stopped(sleep(duration)).await.is_some() && self.is_running()
    }

    async fn run(self: Arc<Self>) {
        tracing::info!(camera_id = self.id, "Stream session started");

        while self.is_running() {
            let endpoint = self.endpoint.read().await.clone();

            match self.connect(&endpoint).await {
                Some(Ok(stream)) => match self.stream_frames(stream).await {
                    Some(message) => {
                        self.release_capture(Some(message.clone())).await;
                        self.fail(FailureKind::StreamInterrupted, message);
                    }
                    None => break,
                },
                Some(Err(kind)) => self.fail(kind, kind.user_message().to_string()),
                None => break,
            }

            if !self.is_running() {
                break;
            }
            self.set_state(ConnectionState::Reconnecting);
            if !self.sleep_unless_stopped(self.config.reconnect_delay).await {
                break;
            }
        }

        self.release_capture(None).await;
        self.set_state(ConnectionState::Stopped);
        tracing::info!(camera_id = self.id, "Stream session stopped");
    }

    /// Wake, then open the URL or a fallback variant; `None` when stopped
    async fn connect(
        &self,
        endpoint: &CameraEndpoint,
    ) -> Option<Result<Box<dyn CaptureStream>, FailureKind>> {
        self.set_state(ConnectionState::Waking);

        let target = self.until_stopped(resolve_target(&endpoint.url)).await?;
        match target {
            Some((ip, port)) => {
                self.until_stopped(wake::wake_until_reachable(
                    self.deps.transport.as_ref(),
                    ip,
                    port,
                    endpoint.uid.as_deref(),
                    &self.config,
                ))
                .await?;
            }
            None => {
                tracing::debug!(camera_id = self.id, "Camera host did not resolve, skipping wake");
            }
        }

        self.set_state(ConnectionState::Connecting);

        for candidate in candidate_urls(&endpoint.url) {
            match self.until_stopped(self.deps.capture.open(&candidate)).await? {
                Ok(stream) => {
                    if candidate != endpoint.url {
                        self.adopt_url(candidate).await;
                    }
                    return Some(Ok(stream));
                }
                Err(e) => {
                    tracing::debug!(
                        camera_id = self.id,
                        path = %url_path(&candidate),
                        error = %e,
                        "Stream open failed"
                    );
                }
            }
        }

        let kind = match target {
            Some((ip, _)) => {
                let metadata = SocketAddr::new(ip, self.config.metadata_port);
                let outcome = self
                    .until_stopped(self.deps.transport.tcp_probe(metadata, self.config.probe_timeout))
                    .await?;
                if outcome.is_open() {
                    FailureKind::StreamDisabled
                } else {
                    FailureKind::Unreachable
                }
            }
            None => FailureKind::Unreachable,
        };
        Some(Err(kind))
    }

    async fn adopt_url(&self, url: String) {
        tracing::info!(camera_id = self.id, path = %url_path(&url), "Using fallback stream path");
        self.endpoint.write().await.url = url.clone();
        self.emit(SessionEvent::UrlChanged {
            session_id: self.id,
            url,
        });
    }

    /// Frame loop; returns the interruption message, or `None` when stopped
    async fn stream_frames(&self, mut stream: Box<dyn CaptureStream>) -> Option<String> {
        *self.capture_info.write().await = Some(stream.info());
        self.set_state(ConnectionState::Streaming);
        self.emit(SessionEvent::Status {
            session_id: self.id,
            connected: true,
            message: "Connected".to_string(),
        });

        let skip = u64::from(self.config.frame_skip.max(1));
        let mut produced: u64 = 0;

        loop {
            let frame = match self.until_stopped(stream.read_frame()).await {
                None => return None,
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    return Some(format!("{}: {}", FailureKind::StreamInterrupted.user_message(), e))
                }
            };
            produced += 1;

            self.write_recording(&frame).await;
            if produced % skip == 0 {
                self.emit(SessionEvent::Frame {
                    session_id: self.id,
                    frame,
                });
            }

            if !self.sleep_unless_stopped(self.config.frame_interval).await {
                return None;
            }
        }
    }

    async fn write_recording(&self, frame: &VideoFrame) {
        let mut recording = self.recording.lock().await;
        let Some(active) = recording.as_mut() else {
            return;
        };

        match active.sink.write_frame(frame).await {
            Ok(()) => active.frames_written += 1,
            Err(e) => {
                let failed = recording.take();
                drop(recording);
                if let Some(active) = failed {
                    tracing::warn!(camera_id = self.id, error = %e, "Recording write failed, closing recording");
                    self.finish_recording(active, Some(e.to_string())).await;
                }
            }
        }
    }

    /// Forget the live capture and close any recording bound to it
    async fn release_capture(&self, reason: Option<String>) {
        let active = {
            let mut recording = self.recording.lock().await;
            *self.capture_info.write().await = None;
            recording.take()
        };
        if let Some(active) = active {
            self.finish_recording(active, reason).await;
        }
    }

    async fn finish_recording(&self, active: ActiveRecording, reason: Option<String>) {
        let ActiveRecording {
            sink,
            path,
            params,
            started_at,
            frames_written,
        } = active;

        if let Err(e) = sink.close().await {
            tracing::warn!(camera_id = self.id, path = %path.display(), error = %e, "Recording did not close cleanly");
        }

        tracing::info!(
            camera_id = self.id,
            path = %path.display(),
            frames = frames_written,
            width = params.width,
            height = params.height,
            duration_secs = (Utc::now() - started_at).num_seconds(),
            "Recording stopped"
        );

        self.emit(SessionEvent::RecordingStopped {
            session_id: self.id,
            path,
            reason,
        });
    }
}

/// Address and RTSP port of the camera URL's host
async fn resolve_target(raw: &str) -> Option<(IpAddr, u16)> {
    let url = Url::parse(raw).ok()?;
    let port = url.port().unwrap_or(DEFAULT_RTSP_PORT);

    match url.host()? {
        Host::Ipv4(ip) => Some((IpAddr::V4(ip), port)),
        Host::Ipv6(ip) => Some((IpAddr::V6(ip), port)),
        Host::Domain(name) => {
            if let Ok(ip) = name.parse::<IpAddr>() {
                return Some((ip, port));
            }
            let mut addrs = tokio::net::lookup_host((name, port)).await.ok()?;
            addrs.next().map(|addr| (addr.ip(), port))
        }
    }
}

/// URL path for logs (keeps credentials out)
fn url_path(raw: &str) -> String {
    Url::parse(raw)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| "<invalid>".to_string())
}
