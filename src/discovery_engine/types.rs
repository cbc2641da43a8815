//! DiscoveryEngine types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use crate::camera_registry::Credentials;
use crate::wire_protocol::DeviceIdentity;

/// How a device was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    VendorBroadcast,
    WsDiscovery,
    Ssdp,
    AddressSweep,
}

impl DiscoverySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoverySource::VendorBroadcast => "vendor_broadcast",
            DiscoverySource::WsDiscovery => "ws_discovery",
            DiscoverySource::Ssdp => "ssdp",
            DiscoverySource::AddressSweep => "address_sweep",
        }
    }
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate camera found during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub ip: IpAddr,
    pub ports: BTreeSet<u16>,
    pub name: Option<String>,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    pub uid: Option<String>,
    pub source: DiscoverySource,
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredDevice {
    pub fn new(ip: IpAddr, source: DiscoverySource) -> Self {
        Self {
            ip,
            ports: BTreeSet::new(),
            name: None,
            model: None,
            manufacturer: None,
            uid: None,
            source,
            discovered_at: Utc::now(),
        }
    }

    /// Device described by a vendor identity
    pub fn from_identity(
        ip: IpAddr,
        identity: DeviceIdentity,
        manufacturer: &str,
        source: DiscoverySource,
    ) -> Self {
        Self {
            name: identity.name.filter(|n| !n.trim().is_empty()),
            model: identity.model,
            manufacturer: Some(manufacturer.to_string()),
            uid: identity.uid,
            ..Self::new(ip, source)
        }
    }

    pub fn with_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.ports.extend(ports);
        self
    }

    pub fn with_source(mut self, source: DiscoverySource) -> Self {
        self.source = source;
        self
    }

    /// Label for lists: name, then model, then address
    pub fn label(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.model.clone())
            .unwrap_or_else(|| self.ip.to_string())
    }
}

/// Scan progress report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    /// 0-100, never decreasing within a run
    pub percent: u8,
    pub current_host_label: String,
}

/// Events emitted during a run
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    DeviceFound(DiscoveredDevice),
    Progress(ScanProgress),
    Complete { count: usize, cancelled: bool },
}

/// Scan parameters
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    /// CIDR (`192.168.1.0/24`) or a bare address
    pub range: String,
    pub credentials: Credentials,
    /// URLs of cameras already configured; their hosts are never reported
    pub known_urls: Vec<String>,
}

/// Result of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub devices: Vec<DiscoveredDevice>,
    pub hosts_checked: usize,
    pub hosts_total: usize,
    pub cancelled: bool,
}

/// Engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Idle,
    Running,
    Cancelled,
    Completed,
}
