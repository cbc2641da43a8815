//! SnapshotService - still images from live frames
//!
//! ## Responsibilities
//!
//! - JPEG encoding of a captured frame using ffmpeg (rawvideo → mjpeg pipe)
//! - Snapshot file naming: `{name}_{id}_{timestamp}.jpg`
//! - ffmpeg availability check

use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::camera_registry::CameraId;
use crate::error::{Error, Result};
use crate::stream_session::VideoFrame;

/// Name used when a display name has no usable characters
const FALLBACK_NAME: &str = "camera";

/// Replace everything except ASCII alphanumerics, `-` and `_` with `_`
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.chars().all(|c| c == '_') {
        FALLBACK_NAME.to_string()
    } else {
        sanitized
    }
}

/// `{sanitized name}_{id}_{YYYYmmdd_HHMMSS}.jpg`
pub fn snapshot_file_name(name: &str, id: CameraId, at: DateTime<Local>) -> String {
    format!(
        "{}_{}_{}.jpg",
        sanitize_name(name),
        id,
        at.format("%Y%m%d_%H%M%S")
    )
}

/// SnapshotService instance
pub struct SnapshotService {
    ffmpeg: String,
    snapshot_dir: PathBuf,
    timeout: Duration,
}

impl SnapshotService {
    /// # Arguments
    /// * `ffmpeg` - ffmpeg executable
    /// * `snapshot_dir` - Directory snapshots are written to (created on first save)
    /// * `timeout` - Limit for one encode
    pub fn new(ffmpeg: impl Into<String>, snapshot_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            snapshot_dir,
            timeout,
        }
    }

    /// Encode `frame` and write it to the snapshot directory
    ///
    /// Returns the path to the saved file
    pub async fn save(&self, name: &str, id: CameraId, frame: &VideoFrame) -> Result<PathBuf> {
        let data = self.encode_jpeg(frame).await?;

        fs::create_dir_all(&self.snapshot_dir).await?;
        let path = self
            .snapshot_dir
            .join(snapshot_file_name(name, id, Local::now()));
        fs::write(&path, &data).await?;

        tracing::info!(
            camera_id = id,
            path = %path.display(),
            size = data.len(),
            "Saved snapshot"
        );

        Ok(path)
    }

    /// Encode a BGR24 frame as JPEG
    ///
    /// Uses kill_on_drop(true) so a timed-out ffmpeg is killed with its future.
    pub async fn encode_jpeg(&self, frame: &VideoFrame) -> Result<Vec<u8>> {
        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.width == 0 || frame.height == 0 || frame.data.len() != expected {
            return Err(Error::Validation(format!(
                "frame {}x{} has {} bytes, expected {}",
                frame.width,
                frame.height,
                frame.data.len(),
                expected
            )));
        }

        let size = format!("{}x{}", frame.width, frame.height);
        let mut child = Command::new(&self.ffmpeg)
            .args([
                "-loglevel", "error",
                "-f", "rawvideo",
                "-pix_fmt", "bgr24",
                "-s", size.as_str(),
                "-i", "-",
                "-frames:v", "1",
                "-f", "image2pipe",
                "-vcodec", "mjpeg",
                "-",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Internal(format!("ffmpeg spawn failed: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Internal("ffmpeg stdin unavailable".to_string()))?;

        let encode = async move {
            stdin.write_all(&frame.data).await?;
            drop(stdin);
            child.wait_with_output().await
        };

        match tokio::time::timeout(self.timeout, encode).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(Error::Internal(format!("ffmpeg failed: {}", stderr.trim())));
                }
                if output.stdout.is_empty() {
                    return Err(Error::Internal("ffmpeg returned empty output".to_string()));
                }
                Ok(output.stdout)
            }
            Ok(Err(e)) => Err(Error::Internal(format!("ffmpeg execution failed: {}", e))),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "ffmpeg snapshot timeout, process killed via kill_on_drop"
                );
                Err(Error::Internal(format!(
                    "ffmpeg timeout ({}ms)",
                    self.timeout.as_millis()
                )))
            }
        }
    }

    /// Check that ffmpeg runs; returns its version line
    pub async fn check_ffmpeg(ffmpeg: &str) -> Result<String> {
        let output = Command::new(ffmpeg)
            .arg("-version")
            .output()
            .await
            .map_err(|e| Error::Internal(format!("ffmpeg not found: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Internal("ffmpeg version check failed".to_string()));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        let first_line = version.lines().next().unwrap_or("unknown");
        Ok(first_line.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Front Door"), "Front_Door");
        assert_eq!(sanitize_name("cam-01_a"), "cam-01_a");
        assert_eq!(sanitize_name(" ../Garage/ "), "___Garage_");
        assert_eq!(sanitize_name("玄関"), "camera");
        assert_eq!(sanitize_name(""), "camera");
    }

    #[test]
    fn test_snapshot_file_name() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            snapshot_file_name("Back Yard", 12, at),
            "Back_Yard_12_20240309_070501.jpg"
        );
    }

    #[tokio::test]
    async fn test_rejects_short_frame() {
        let service = SnapshotService::new("ffmpeg", PathBuf::from("unused"), Duration::from_secs(1));
        let frame = VideoFrame {
            data: Bytes::from(vec![0u8; 10]),
            width: 4,
            height: 2,
            sequence: 1,
        };
        let err = service.encode_jpeg(&frame).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_ffmpeg() {
        let result = SnapshotService::check_ffmpeg("/nonexistent/ffmpeg-binary").await;
        assert!(result.is_err());
    }
}
