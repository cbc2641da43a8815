//! StreamSession types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::capture::VideoFrame;
use crate::camera_registry::CameraId;
use crate::error::FailureKind;
use crate::network_probe::VENDOR_UDP_PORTS;

/// Per-session connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum ConnectionState {
    Idle,
    Waking,
    Connecting,
    Streaming,
    Failed(FailureKind),
    Reconnecting,
    /// Terminal
    Stopped,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Waking => "waking",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Failed(_) => "failed",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Stopped => "stopped",
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, ConnectionState::Streaming)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Failed(kind) => write!(f, "failed ({})", kind.as_str()),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Events published by a session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Frame {
        session_id: CameraId,
        frame: VideoFrame,
    },
    Status {
        session_id: CameraId,
        connected: bool,
        message: String,
    },
    StateChanged {
        session_id: CameraId,
        state: ConnectionState,
    },
    /// A fallback URL worked; the owner should persist it
    UrlChanged {
        session_id: CameraId,
        url: String,
    },
    RecordingStopped {
        session_id: CameraId,
        path: PathBuf,
        /// `None` for an explicit stop
        reason: Option<String>,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> CameraId {
        match self {
            SessionEvent::Frame { session_id, .. }
            | SessionEvent::Status { session_id, .. }
            | SessionEvent::StateChanged { session_id, .. }
            | SessionEvent::UrlChanged { session_id, .. }
            | SessionEvent::RecordingStopped { session_id, .. } => *session_id,
        }
    }
}

/// Session timing and wake parameters
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Wake rounds before connecting anyway
    pub wake_attempts: u32,
    /// Spacing between the starts of consecutive wake rounds
    pub wake_interval: Duration,
    /// Reachability polls per wake round
    pub wake_polls: u32,
    pub wake_poll_timeout: Duration,
    pub wake_ports: Vec<u16>,
    /// Vendor metadata port, used to tell "streaming disabled" from "unreachable"
    pub metadata_port: u16,
    pub probe_timeout: Duration,
    /// Pause after each frame
    pub frame_interval: Duration,
    /// Offer every n-th frame to subscribers
    pub frame_skip: u32,
    pub reconnect_delay: Duration,
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            wake_attempts: 10,
            wake_interval: Duration::from_secs(1),
            wake_polls: 3,
            wake_poll_timeout: Duration::from_millis(250),
            wake_ports: VENDOR_UDP_PORTS.to_vec(),
            metadata_port: 8000,
            probe_timeout: Duration::from_millis(300),
            frame_interval: Duration::from_millis(33),
            frame_skip: 1,
            reconnect_delay: Duration::from_secs(5),
            event_capacity: 64,
        }
    }
}
