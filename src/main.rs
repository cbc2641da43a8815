//! camgrid - camera discovery and live session runner
//!
//! Main entry point for the command line tool.

use anyhow::Context;
use camgrid::{
    camera_registry::{CameraRegistry, Credentials},
    camera_status_tracker::{CameraConnectionStatus, CameraStatusEvent, CameraStatusTracker},
    discovery_engine::{DiscoveredDevice, DiscoveryEngine, DiscoveryEvent, ScanRequest},
    network_probe::LanTransport,
    snapshot_service::SnapshotService,
    stream_session::{ConnectionState, SessionDeps, SessionEvent, SessionGroup},
    AppConfig,
};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Snapshot encode limit
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "camgrid", version, about = "Find and watch RTSP cameras on the LAN")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Discover cameras in a CIDR range (e.g. 192.168.1.0/24)
    Scan {
        range: String,
        /// Camera API username
        #[arg(long, env = "CAMGRID_USER", default_value = "")]
        user: String,
        /// Camera API password
        #[arg(long, env = "CAMGRID_PASSWORD", default_value = "", hide_env_values = true)]
        password: String,
        /// Skip hosts of these camera URLs
        #[arg(long = "known")]
        known_urls: Vec<String>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Stream one or more cameras until Ctrl-C
    Watch {
        #[arg(required = true)]
        urls: Vec<String>,
        /// Record every camera into this directory once it streams
        #[arg(long)]
        record: Option<PathBuf>,
        /// Save a JPEG of the first frame of every camera
        #[arg(long)]
        snapshot: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camgrid=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting camgrid v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::default();
    tracing::info!(
        recording_dir = %config.recording_dir.display(),
        snapshot_dir = %config.snapshot_dir.display(),
        scan_ports = ?config.scan_ports,
        "Configuration loaded"
    );

    match Cli::parse().command {
        Command::Scan {
            range,
            user,
            password,
            known_urls,
            json,
        } => {
            let request = ScanRequest {
                range,
                credentials: Credentials::new(user, password),
                known_urls,
            };
            scan(&config, request, json).await
        }
        Command::Watch {
            urls,
            record,
            snapshot,
        } => watch(&config, urls, record, snapshot).await,
    }
}

async fn scan(config: &AppConfig, request: ScanRequest, json: bool) -> anyhow::Result<()> {
    let engine = DiscoveryEngine::new(
        Arc::new(LanTransport::new()),
        config.scan_config(),
        config.resolver_config(),
    )?;

    let cancel = engine.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, cancelling scan");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(DiscoveryEvent::DeviceFound(device)) => {
                    if !json {
                        println!("found {}", describe(&device));
                    }
                }
                Ok(DiscoveryEvent::Progress(p)) => {
                    tracing::debug!(percent = p.percent, host = %p.current_host_label, "Scan progress");
                }
                Ok(DiscoveryEvent::Complete { .. }) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(_)) => {}
            }
        }
    });

    let summary = engine.run(request).await?;
    let _ = printer.await;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{} device(s), {}/{} hosts checked{}",
            summary.devices.len(),
            summary.hosts_checked,
            summary.hosts_total,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
    }
    Ok(())
}

fn describe(device: &DiscoveredDevice) -> String {
    let ports: Vec<String> = device.ports.iter().map(u16::to_string).collect();
    format!(
        "{:<15} {:<24} {:<10} {:<16} [{}] via {}",
        device.ip,
        device.label(),
        device.manufacturer.as_deref().unwrap_or("-"),
        device.uid.as_deref().unwrap_or("-"),
        ports.join(","),
        device.source
    )
}

async fn watch(
    config: &AppConfig,
    urls: Vec<String>,
    record: Option<PathBuf>,
    snapshot: bool,
) -> anyhow::Result<()> {
    let mut registry = CameraRegistry::new();
    for url in &urls {
        registry
            .add(url, None, None)
            .with_context(|| format!("invalid camera URL: {}", url))?;
    }

    let group = SessionGroup::new(
        config.session_config(),
        SessionDeps::lan(&config.ffmpeg, &config.ffprobe),
    );
    let snapshots = SnapshotService::new(
        config.ffmpeg.clone(),
        config.snapshot_dir.clone(),
        SNAPSHOT_TIMEOUT,
    );
    if snapshot {
        let version = SnapshotService::check_ffmpeg(&config.ffmpeg).await?;
        tracing::info!(ffmpeg = %version, "Snapshots enabled");
    }
    let tracker = CameraStatusTracker::new();
    let mut snapped = HashSet::new();

    let mut events = group.subscribe();
    let started = group.start_all(registry.cameras()).await;
    println!("{} stream(s) started, Ctrl-C to stop", started);

    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => event,
        };
        let event = match event {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped = skipped, "Event receiver lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        if let Some(transition) = tracker.observe(&event).await {
            let verb = match transition {
                CameraStatusEvent::Lost => "lost",
                CameraStatusEvent::Recovered => "recovered",
            };
            println!("camera {} {}", event.session_id(), verb);
        }

        match event {
            SessionEvent::Frame { session_id, frame } => {
                if snapshot && snapped.insert(session_id) {
                    let name = registry
                        .get(session_id)
                        .map(|c| c.display_name.clone())
                        .unwrap_or_default();
                    match snapshots.save(&name, session_id, &frame).await {
                        Ok(path) => println!("camera {} snapshot {}", session_id, path.display()),
                        Err(e) => tracing::warn!(camera_id = session_id, error = %e, "Snapshot failed"),
                    }
                }
            }
            SessionEvent::Status {
                session_id,
                message,
                ..
            } => println!("camera {}: {}", session_id, message),
            SessionEvent::StateChanged {
                session_id,
                state: ConnectionState::Streaming,
            } => {
                if let (Some(dir), Some(session)) = (&record, group.get(session_id).await) {
                    if !session.is_recording().await {
                        if let Some(path) = session.start_recording(dir).await {
                            println!("camera {} recording {}", session_id, path.display());
                        }
                    }
                }
            }
            SessionEvent::StateChanged { .. } => {}
            SessionEvent::UrlChanged { session_id, url } => {
                match registry.apply_url_update(session_id, &url) {
                    Ok(()) => println!(
                        "camera {} now uses fallback stream {}",
                        session_id,
                        url.rsplit('/').next().unwrap_or_default()
                    ),
                    Err(e) => tracing::warn!(camera_id = session_id, error = %e, "URL update rejected"),
                }
            }
            SessionEvent::RecordingStopped {
                session_id,
                path,
                reason,
            } => match reason {
                Some(reason) => println!(
                    "camera {} recording {} stopped: {}",
                    session_id,
                    path.display(),
                    reason
                ),
                None => println!("camera {} recording {} saved", session_id, path.display()),
            },
        }
    }

    tracing::info!("Shutting down");
    for camera in registry.cameras() {
        if tracker.get_status(camera.id).await == CameraConnectionStatus::Unknown {
            println!("camera {} never reported a status", camera.id);
        }
    }
    let offline = tracker.get_offline_cameras().await;
    if !offline.is_empty() {
        let ids: Vec<String> = offline.iter().map(u32::to_string).collect();
        println!("offline at shutdown: camera {}", ids.join(", "));
    }
    let recordings = group.stop_all_recordings().await;
    let stopped = group.stop_all().await;
    println!("{} stream(s) stopped, {} recording(s) closed", stopped, recordings);
    Ok(())
}
