//! Capture seam and the ffmpeg-backed implementation
//!
//! `ffprobe` reads the stream geometry, then an `ffmpeg` child decodes the
//! RTSP stream (TCP transport) to raw BGR24 frames on stdout. The child is
//! spawned with `kill_on_drop(true)`, so dropping the stream kills it.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

use crate::error::{Error, Result};

/// Stream geometry reported by the capture
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
}

/// One decoded frame (BGR24)
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    /// Per-capture frame counter, starting at 1
    pub sequence: u64,
}

/// An open capture
#[async_trait]
pub trait CaptureStream: Send {
    fn info(&self) -> StreamInfo;

    async fn read_frame(&mut self) -> Result<VideoFrame>;
}

/// Opens captures for URLs
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn CaptureStream>>;
}

/// ffprobe/ffmpeg capture backend
#[derive(Debug, Clone)]
pub struct FfmpegCapture {
    ffmpeg: String,
    ffprobe: String,
    /// ffprobe timeout
    open_timeout: Duration,
    /// Max wait for one frame
    read_timeout: Duration,
}

impl Default for FfmpegCapture {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegCapture {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            open_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
        }
    }

    async fn probe(&self, url: &str) -> Result<StreamInfo> {
        let child = Command::new(&self.ffprobe)
            .args([
                "-v", "error",
                "-rtsp_transport", "tcp",
                "-select_streams", "v:0",
                "-show_entries", "stream=width,height,avg_frame_rate,r_frame_rate",
                "-of", "json",
                url,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Capture(format!("ffprobe spawn failed: {}", e)))?;

        let output = match tokio::time::timeout(self.open_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(Error::Capture(format!("ffprobe execution failed: {}", e))),
            Err(_) => {
                return Err(Error::Capture(format!(
                    "ffprobe timeout ({}s)",
                    self.open_timeout.as_secs()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Capture(format!("ffprobe failed: {}", stderr.trim())));
        }

        parse_probe_output(&output.stdout)
            .ok_or_else(|| Error::Capture("no video stream found".to_string()))
    }
}

#[async_trait]
impl CaptureBackend for FfmpegCapture {
    async fn open(&self, url: &str) -> Result<Box<dyn CaptureStream>> {
        let info = self.probe(url).await?;
        let (width, height) = match (info.width, info.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(Error::Capture("stream reports no frame size".to_string())),
        };

        let mut child = Command::new(&self.ffmpeg)
            .args([
                "-rtsp_transport", "tcp",
                "-i", url,
                "-an",
                "-f", "rawvideo",
                "-pix_fmt", "bgr24",
                "-loglevel", "error",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Capture(format!("ffmpeg spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Capture("ffmpeg stdout unavailable".to_string()))?;

        Ok(Box::new(FfmpegStream {
            _child: child,
            stdout,
            info,
            width,
            height,
            sequence: 0,
            read_timeout: self.read_timeout,
        }))
    }
}

struct FfmpegStream {
    /// Held so the decoder is killed when the stream drops
    _child: Child,
    stdout: ChildStdout,
    info: StreamInfo,
    width: u32,
    height: u32,
    sequence: u64,
    read_timeout: Duration,
}

#[async_trait]
impl CaptureStream for FfmpegStream {
    fn info(&self) -> StreamInfo {
        self.info
    }

    async fn read_frame(&mut self) -> Result<VideoFrame> {
        let frame_len = self.width as usize * self.height as usize * 3;
        let mut buf = BytesMut::zeroed(frame_len);

        match tokio::time::timeout(self.read_timeout, self.stdout.read_exact(&mut buf)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(Error::Capture(format!("stream ended: {}", e))),
            Err(_) => {
                return Err(Error::Capture(format!(
                    "no frame within {}s",
                    self.read_timeout.as_secs()
                )))
            }
        }

        self.sequence += 1;
        Ok(VideoFrame {
            data: buf.freeze(),
            width: self.width,
            height: self.height,
            sequence: self.sequence,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

/// Parse `ffprobe -of json` output for the first video stream
pub(crate) fn parse_probe_output(stdout: &[u8]) -> Option<StreamInfo> {
    let parsed: ProbeOutput = serde_json::from_slice(stdout).ok()?;
    let stream = parsed.streams.into_iter().next()?;
    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate));

    Some(StreamInfo {
        width: stream.width,
        height: stream.height,
        fps,
    })
}

/// `"30000/1001"` or `"25"`; zero denominators and zero rates yield `None`
pub(crate) fn parse_frame_rate(raw: &str) -> Option<f64> {
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
