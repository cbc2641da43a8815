//! DeviceResolver - best-effort camera identification
//!
//! ## Responsibilities
//!
//! - Vendor UDP device-info query (unicast)
//! - Vendor HTTP API with digest authentication
//! - Generic RTSP fallback for hosts with only a streaming port
//!
//! Failures are logged and swallowed; a failing host never aborts a scan.

mod digest;
mod http_info;

pub use digest::{parse_challenge, AuthChallenge, DigestChallenge};
pub use http_info::{fetch_device_info, DEVICE_INFO_PATH};

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::camera_registry::Credentials;
use crate::discovery_engine::{DiscoveredDevice, DiscoverySource};
use crate::error::Result;
use crate::network_probe::{Transport, VENDOR_UDP_PORTS};
use crate::wire_protocol::{extract_device_info, query};

/// Manufacturer reported for devices that speak the vendor protocol
pub const VENDOR_MANUFACTURER: &str = "Reolink";

/// Name/manufacturer for hosts only identified by an RTSP port
pub const GENERIC_RTSP_NAME: &str = "RTSP Camera";
pub const GENERIC_MANUFACTURER: &str = "Generic";

/// Resolver configuration
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Ports probed for the vendor HTTP API
    pub http_ports: Vec<u16>,
    /// Ports that mark a host as a generic RTSP camera
    pub rtsp_ports: Vec<u16>,
    pub udp_ports: Vec<u16>,
    pub udp_window: Duration,
    pub http_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            http_ports: vec![80, 8000],
            rtsp_ports: vec![554, 8554],
            udp_ports: VENDOR_UDP_PORTS.to_vec(),
            udp_window: Duration::from_millis(1500),
            http_timeout: Duration::from_secs(3),
        }
    }
}

/// Identifies cameras behind open ports
pub struct DeviceResolver {
    transport: Arc<dyn Transport>,
    client: reqwest::Client,
    config: ResolverConfig,
}

impl DeviceResolver {
    pub fn new(transport: Arc<dyn Transport>, config: ResolverConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self {
            transport,
            client,
            config,
        })
    }

    /// Resolve a host into a device, or `None` if it does not look like a camera
    ///
    /// The returned device is tagged [`DiscoverySource::AddressSweep`];
    /// callers retag it with the path that surfaced the host.
    pub async fn resolve(
        &self,
        host: IpAddr,
        open_ports: &BTreeSet<u16>,
        credentials: &Credentials,
    ) -> Option<DiscoveredDevice> {
        if let Some(device) = self.resolve_udp(host).await {
            return Some(device.with_ports(open_ports.iter().copied()));
        }

        for port in self.config.http_ports.iter().filter(|p| open_ports.contains(*p)) {
            match fetch_device_info(&self.client, host, *port, credentials).await {
                Ok(Some(identity)) => {
                    tracing::debug!(ip = %host, port = *port, "Identified via HTTP API");
                    return Some(
                        DiscoveredDevice::from_identity(
                            host,
                            identity,
                            VENDOR_MANUFACTURER,
                            DiscoverySource::AddressSweep,
                        )
                        .with_ports(open_ports.iter().copied()),
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(ip = %host, port = *port, error = %e, "HTTP device info failed");
                }
            }
        }

        if self.config.rtsp_ports.iter().any(|p| open_ports.contains(p)) {
            tracing::debug!(ip = %host, "Generic RTSP device");
            let mut device = DiscoveredDevice::new(host, DiscoverySource::AddressSweep)
                .with_ports(open_ports.iter().copied());
            device.name = Some(GENERIC_RTSP_NAME.to_string());
            device.manufacturer = Some(GENERIC_MANUFACTURER.to_string());
            return Some(device);
        }

        None
    }

    async fn resolve_udp(&self, host: IpAddr) -> Option<DiscoveredDevice> {
        let responses = self
            .transport
            .udp_query(host, &self.config.udp_ports, &[query::device_info()], self.config.udp_window)
            .await;

        responses.into_iter().find_map(|resp| {
            if resp.from.ip() != host {
                tracing::debug!(ip = %host, from = %resp.from, "Ignoring vendor reply from another host");
                return None;
            }
            let identity = extract_device_info(&resp.message.payload)?.into_identity();
            if !identity.is_identified() {
                return None;
            }
            tracing::debug!(ip = %host, from = %resp.from, "Identified via vendor UDP");
            Some(DiscoveredDevice::from_identity(
                host,
                identity,
                VENDOR_MANUFACTURER,
                DiscoverySource::AddressSweep,
            ))
        })
    }
}
