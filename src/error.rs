//! Error handling for camgrid
//!
//! Two layers:
//! - [`Error`] for operations that can genuinely fail (bad input, I/O, process spawn)
//! - [`FailureKind`] for per-camera / per-host failures that are converted into
//!   status events or skipped candidates instead of being propagated

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error (bad CIDR, bad URL, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict (scan already running etc.)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Capture backend error (ffprobe/ffmpeg decode side)
    #[error("Capture error: {0}")]
    Capture(String),

    /// Recording sink error (ffmpeg encode side)
    #[error("Recording error: {0}")]
    Recording(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Classified per-camera / per-host failure
///
/// These never terminate a scan or a session. They surface as a short
/// message in a status event, or as a silently skipped candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No TCP/UDP response at all
    Unreachable,
    /// Control port reachable, stream port is not
    StreamDisabled,
    /// A previously open stream stopped returning frames
    StreamInterrupted,
    /// Malformed or unrecognized discovery response
    ProtocolDecodeFailure,
    /// Recording requested twice, or with no active capture
    ResourceBusy,
}

impl FailureKind {
    /// Short user-facing message
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureKind::Unreachable => "Camera unreachable",
            FailureKind::StreamDisabled => {
                "Camera reachable but RTSP streaming is disabled - enable RTSP in the camera's network settings"
            }
            FailureKind::StreamInterrupted => "Stream interrupted",
            FailureKind::ProtocolDecodeFailure => "Unrecognized discovery response",
            FailureKind::ResourceBusy => "Resource busy",
        }
    }

    /// Stable identifier for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Unreachable => "unreachable",
            FailureKind::StreamDisabled => "stream_disabled",
            FailureKind::StreamInterrupted => "stream_interrupted",
            FailureKind::ProtocolDecodeFailure => "protocol_decode_failure",
            FailureKind::ResourceBusy => "resource_busy",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.user_message())
    }
}
