//! camgrid Library
//!
//! Connectivity and LAN discovery for battery-powered RTSP cameras.
//!
//! ## Architecture
//!
//! 1. WireProtocol - Vendor framed-JSON UDP codec, WS-Discovery/SSDP probes
//! 2. NetworkProbe - TCP port probe, UDP query/wake, multicast listening
//! 3. DeviceResolver - Camera identification (UDP, HTTP digest API, RTSP)
//! 4. DiscoveryEngine - Broadcast, passive and sweep discovery over a CIDR
//! 5. StreamSession - Per-camera wake/connect/stream/record state machine
//! 6. CameraRegistry - Configured cameras with stable ids
//! 7. CameraStatusTracker - Lost/recovered transition detection
//! 8. SnapshotService - JPEG stills from live frames
//!
//! ## Design Principles
//!
//! - Network, capture and recording sit behind traits so sessions and scans
//!   run against in-memory fakes in tests
//! - Per-host and per-camera failures become events, never engine errors

pub mod camera_registry;
pub mod camera_status_tracker;
pub mod config;
pub mod device_resolver;
pub mod discovery_engine;
pub mod error;
pub mod network_probe;
pub mod snapshot_service;
pub mod stream_session;
pub mod wire_protocol;

#[cfg(test)]
pub(crate) mod testing;

pub use config::AppConfig;
pub use error::{Error, Result};
