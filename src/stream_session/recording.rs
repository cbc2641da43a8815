//! Recording seam and the ffmpeg encoder sink

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

use super::capture::{StreamInfo, VideoFrame};
use crate::camera_registry::CameraId;
use crate::error::{Error, Result};

pub const DEFAULT_RECORDING_FPS: f64 = 25.0;
pub const MAX_RECORDING_FPS: f64 = 120.0;
pub const DEFAULT_RECORDING_WIDTH: u32 = 640;
pub const DEFAULT_RECORDING_HEIGHT: u32 = 480;

/// Recording container extension (Matroska)
pub const RECORDING_EXTENSION: &str = "mkv";

/// Encoder parameters captured when recording starts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingParams {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl RecordingParams {
    pub fn from_stream_info(info: &StreamInfo) -> Self {
        let fps = info
            .fps
            .filter(|f| *f > 0.0 && *f <= MAX_RECORDING_FPS)
            .unwrap_or(DEFAULT_RECORDING_FPS);
        let (width, height) = match (info.width, info.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => (DEFAULT_RECORDING_WIDTH, DEFAULT_RECORDING_HEIGHT),
        };
        Self { width, height, fps }
    }
}

/// `camera_{id}_{YYYYmmdd_HHMMSS}.mkv`
pub fn recording_file_name(camera_id: CameraId, at: DateTime<Local>) -> String {
    format!(
        "camera_{}_{}.{}",
        camera_id,
        at.format("%Y%m%d_%H%M%S"),
        RECORDING_EXTENSION
    )
}

/// Live video-file writer
#[async_trait]
pub trait FrameSink: Send {
    async fn write_frame(&mut self, frame: &VideoFrame) -> Result<()>;

    /// Flush and finalize the file
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Creates sinks for new recordings
#[async_trait]
pub trait SinkFactory: Send + Sync {
    async fn create(&self, path: &Path, params: &RecordingParams) -> Result<Box<dyn FrameSink>>;
}

/// Sink attached to a streaming session
pub(crate) struct ActiveRecording {
    pub sink: Box<dyn FrameSink>,
    pub path: PathBuf,
    pub params: RecordingParams,
    pub started_at: DateTime<Utc>,
    pub frames_written: u64,
}

/// ffmpeg H.264/Matroska encoder fed with raw BGR24 frames on stdin
#[derive(Debug, Clone)]
pub struct FfmpegRecorder {
    ffmpeg: String,
    close_timeout: Duration,
}

impl Default for FfmpegRecorder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegRecorder {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            close_timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl SinkFactory for FfmpegRecorder {
    async fn create(&self, path: &Path, params: &RecordingParams) -> Result<Box<dyn FrameSink>> {
        let size = format!("{}x{}", params.width, params.height);
        let fps = format!("{}", params.fps);

        let mut child = Command::new(&self.ffmpeg)
            .args([
                "-y",
                "-loglevel", "error",
                "-f", "rawvideo",
                "-pix_fmt", "bgr24",
                "-s", size.as_str(),
                "-r", fps.as_str(),
                "-i", "-",
                "-an",
                "-c:v", "libx264",
                "-preset", "veryfast",
                "-pix_fmt", "yuv420p",
                "-f", "matroska",
            ])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Recording(format!("ffmpeg spawn failed: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Recording("ffmpeg stdin unavailable".to_string()))?;

        Ok(Box::new(FfmpegSink {
            child,
            stdin: Some(stdin),
            params: *params,
            close_timeout: self.close_timeout,
        }))
    }
}

struct FfmpegSink {
    child: Child,
    stdin: Option<ChildStdin>,
    params: RecordingParams,
    close_timeout: Duration,
}

#[async_trait]
impl FrameSink for FfmpegSink {
    async fn write_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        if frame.width != self.params.width || frame.height != self.params.height {
            return Err(Error::Recording(format!(
                "frame size {}x{} differs from recording size {}x{}",
                frame.width, frame.height, self.params.width, self.params.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Recording("encoder input closed".to_string()))?;
        stdin
            .write_all(&frame.data)
            .await
            .map_err(|e| Error::Recording(format!("encoder write failed: {}", e)))
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        // EOF on stdin lets ffmpeg finalize the container
        drop(self.stdin.take());

        match tokio::time::timeout(self.close_timeout, self.child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(Error::Recording(format!("encoder exited with {}", status))),
            Ok(Err(e)) => Err(Error::Recording(format!("encoder wait failed: {}", e))),
            Err(_) => Err(Error::Recording("encoder did not finish in time".to_string())),
        }
    }
}
