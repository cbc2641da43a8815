//! Application configuration from `CAMGRID_*` environment variables

use std::path::PathBuf;
use std::time::Duration;

use crate::device_resolver::ResolverConfig;
use crate::discovery_engine::{ScanConfig, DEFAULT_SCAN_PORTS};
use crate::stream_session::SessionConfig;

/// Upper bound for millisecond timing overrides
pub const MAX_TIMING_MS: u64 = 60_000;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Recording output directory
    pub recording_dir: PathBuf,
    /// Snapshot output directory
    pub snapshot_dir: PathBuf,
    /// TCP ports probed during an address sweep
    pub scan_ports: Vec<u16>,
    pub tcp_timeout: Duration,
    /// Idle window for vendor UDP replies
    pub udp_window: Duration,
    /// Pause before a failed session reconnects
    pub reconnect_delay: Duration,
    /// ffmpeg executable
    pub ffmpeg: String,
    /// ffprobe executable
    pub ffprobe: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl AppConfig {
    /// Build from an arbitrary variable source; unset or unparsable values use defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let millis = |key: &str, default: u64| {
            let ms: u64 = lookup(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default);
            Duration::from_millis(ms.min(MAX_TIMING_MS))
        };

        Self {
            recording_dir: lookup("CAMGRID_RECORDING_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("recordings")),
            snapshot_dir: lookup("CAMGRID_SNAPSHOT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("snapshots")),
            scan_ports: lookup("CAMGRID_SCAN_PORTS")
                .map(|v| parse_ports(&v))
                .filter(|ports| !ports.is_empty())
                .unwrap_or_else(|| DEFAULT_SCAN_PORTS.to_vec()),
            tcp_timeout: millis("CAMGRID_TCP_TIMEOUT_MS", 300),
            udp_window: millis("CAMGRID_UDP_WINDOW_MS", 1500),
            reconnect_delay: Duration::from_secs(
                lookup("CAMGRID_RECONNECT_DELAY_SEC")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(5),
            ),
            ffmpeg: lookup("CAMGRID_FFMPEG").unwrap_or_else(|| "ffmpeg".to_string()),
            ffprobe: lookup("CAMGRID_FFPROBE").unwrap_or_else(|| "ffprobe".to_string()),
        }
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            ports: self.scan_ports.clone(),
            tcp_timeout: self.tcp_timeout,
            udp_window: self.udp_window,
            ..Default::default()
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            udp_window: self.udp_window,
            ..Default::default()
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            probe_timeout: self.tcp_timeout,
            reconnect_delay: self.reconnect_delay,
            ..Default::default()
        }
    }
}

/// Comma-separated port list; invalid entries are skipped
fn parse_ports(value: &str) -> Vec<u16> {
    let mut ports: Vec<u16> = value
        .split(',')
        .filter_map(|p| p.trim().parse().ok())
        .filter(|p| *p != 0)
        .collect();
    ports.dedup();
    ports
}
