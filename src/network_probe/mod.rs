//! NetworkProbe - low-level reachability and discovery primitives
//!
//! ## Responsibilities
//!
//! - TCP connect probing with classified outcomes
//! - Vendor UDP query/response exchange (unicast and broadcast)
//! - Wake bursts for sleeping battery cameras
//! - WS-Discovery / SSDP multicast listening
//!
//! Everything above this layer talks to the network through [`Transport`]
//! so discovery and session logic can be driven by fakes in tests.

mod multicast;
mod tcp;
mod udp;

pub use multicast::passive_discover;
pub use tcp::{tcp_probe, ProbeOutcome};
pub use udp::{
    udp_broadcast, udp_query, wake_burst, UdpResponse, WAKE_PACKET, WAKE_REPEATS, WAKE_SEND_GAP,
};

use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::wire_protocol::{Payload, PassiveProtocol};

/// Vendor UDP discovery/control ports
pub const VENDOR_UDP_PORTS: [u16; 4] = [9000, 10000, 2000, 8000];

/// Network access used by discovery and streaming sessions
#[async_trait]
pub trait Transport: Send + Sync {
    async fn tcp_probe(&self, addr: SocketAddr, timeout: Duration) -> ProbeOutcome;

    /// First decoded reply from `target`; transport errors yield an empty list
    async fn udp_query(
        &self,
        target: IpAddr,
        ports: &[u16],
        queries: &[Payload],
        window: Duration,
    ) -> Vec<UdpResponse>;

    /// Every distinct responder to a broadcast; transport errors yield an empty list
    async fn udp_broadcast(
        &self,
        target: IpAddr,
        ports: &[u16],
        queries: &[Payload],
        window: Duration,
    ) -> Vec<UdpResponse>;

    async fn wake_burst(&self, host: IpAddr, uid: Option<&str>, ports: &[u16]);

    async fn passive_discover(&self, protocol: PassiveProtocol, window: Duration) -> Vec<IpAddr>;
}

/// Real LAN transport
#[derive(Debug, Clone, Copy, Default)]
pub struct LanTransport;

impl LanTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for LanTransport {
    async fn tcp_probe(&self, addr: SocketAddr, timeout: Duration) -> ProbeOutcome {
        tcp::tcp_probe(addr, timeout).await
    }

    async fn udp_query(
        &self,
        target: IpAddr,
        ports: &[u16],
        queries: &[Payload],
        window: Duration,
    ) -> Vec<UdpResponse> {
        match udp::udp_query(target, ports, queries, window).await {
            Ok(responses) => responses,
            Err(e) => {
                tracing::warn!(target = %target, error = %e, "UDP query failed");
                Vec::new()
            }
        }
    }

    async fn udp_broadcast(
        &self,
        target: IpAddr,
        ports: &[u16],
        queries: &[Payload],
        window: Duration,
    ) -> Vec<UdpResponse> {
        match udp::udp_broadcast(target, ports, queries, window).await {
            Ok(responses) => responses,
            Err(e) => {
                tracing::warn!(target = %target, error = %e, "UDP broadcast failed");
                Vec::new()
            }
        }
    }

    async fn wake_burst(&self, host: IpAddr, uid: Option<&str>, ports: &[u16]) {
        if let Err(e) = udp::wake_burst(host, uid, ports).await {
            tracing::debug!(host = %host, error = %e, "Wake burst failed");
        }
    }

    async fn passive_discover(&self, protocol: PassiveProtocol, window: Duration) -> Vec<IpAddr> {
        match multicast::passive_discover(protocol, window).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(protocol = %protocol, error = %e, "Passive discovery failed");
                Vec::new()
            }
        }
    }
}
