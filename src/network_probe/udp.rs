use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout, Instant};

use crate::error::{FailureKind, Result};
use crate::wire_protocol::{self, encode, try_decode, Endianness, Payload, WireMessage};

/// Null packet sent ahead of queries to wake sleeping devices
pub const WAKE_PACKET: [u8; 4] = [0; 4];

/// Wake burst rounds
pub const WAKE_REPEATS: usize = 3;

/// Delay between repetitions of a wake burst
pub const WAKE_SEND_GAP: Duration = Duration::from_millis(50);

/// Upper bound on collection time, in idle windows
const MAX_WINDOWS: u32 = 4;

const RECV_BUF_SIZE: usize = 8192;

/// One decoded reply
#[derive(Debug, Clone, PartialEq)]
pub struct UdpResponse {
    pub from: SocketAddr,
    pub message: WireMessage,
}

async fn bind_for(target: &IpAddr, broadcast: bool) -> Result<UdpSocket> {
    let bind_addr = match target {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    if broadcast {
        socket.set_broadcast(true)?;
    }
    Ok(socket)
}

/// Send queries (both byte orders) to one host and return its first valid reply
///
/// Replies from any other address are ignored.
pub async fn udp_query(
    target: IpAddr,
    ports: &[u16],
    queries: &[Payload],
    window: Duration,
) -> Result<Vec<UdpResponse>> {
    exchange(target, ports, queries, window, false).await
}

/// Send queries to a broadcast address and collect every distinct responder
///
/// Collection ends once `window` passes without a new packet.
pub async fn udp_broadcast(
    target: IpAddr,
    ports: &[u16],
    queries: &[Payload],
    window: Duration,
) -> Result<Vec<UdpResponse>> {
    exchange(target, ports, queries, window, true).await
}

/// Collection deadline of `MAX_WINDOWS` idle windows, saturating on huge windows
fn collect_deadline(start: Instant, window: Duration) -> Option<Instant> {
    start.checked_add(window.saturating_mul(MAX_WINDOWS))
}

async fn exchange(
    target: IpAddr,
    ports: &[u16],
    queries: &[Payload],
    window: Duration,
    broadcast: bool,
) -> Result<Vec<UdpResponse>> {
    let socket = bind_for(&target, broadcast).await?;

    let encoded: Vec<Vec<u8>> = queries
        .iter()
        .flat_map(|q| Endianness::BOTH.into_iter().map(move |e| encode(q, e)))
        .collect();

    for &port in ports {
        let dest = SocketAddr::new(target, port);
        if let Err(e) = socket.send_to(&WAKE_PACKET, dest).await {
            tracing::debug!(dest = %dest, error = %e, "UDP wake send failed");
            continue;
        }
        for packet in &encoded {
            if let Err(e) = socket.send_to(packet, dest).await {
                tracing::debug!(dest = %dest, error = %e, "UDP query send failed");
            }
        }
    }

    let hard_deadline = collect_deadline(Instant::now(), window);
    let mut seen: HashSet<IpAddr> = HashSet::new();
    let mut responses = Vec::new();
    let mut buf = vec![0u8; RECV_BUF_SIZE];

    loop {
        let wait = match hard_deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                window.min(deadline - now)
            }
            None => window,
        };

        match timeout(wait, socket.recv_from(&mut buf)).await {
            Err(_) => break,
            Ok(Err(e)) => {
                // ICMP port unreachable surfaces here on some platforms
                tracing::debug!(target = %target, error = %e, "UDP receive error");
                continue;
            }
            Ok(Ok((n, from))) => {
                if !broadcast && from.ip() != target {
                    tracing::debug!(target = %target, from = %from, "Ignoring reply from another host");
                    continue;
                }
                match try_decode(&buf[..n]) {
                    Err(e) => {
                        tracing::debug!(
                            from = %from,
                            bytes = n,
                            kind = FailureKind::ProtocolDecodeFailure.as_str(),
                            error = %e,
                            "Skipping undecodable datagram"
                        );
                    }
                    Ok(message) => {
                        if !seen.insert(from.ip()) {
                            continue;
                        }
                        tracing::debug!(from = %from, endianness = ?message.endianness, "UDP reply decoded");
                        responses.push(UdpResponse { from, message });
                        if !broadcast {
                            break;
                        }
                    }
                }
            }
        }
    }

    Ok(responses)
}

/// Fire-and-forget wake burst
///
/// Never waits for replies; callers poll reachability separately.
pub async fn wake_burst(host: IpAddr, uid: Option<&str>, ports: &[u16]) -> Result<()> {
    let socket = bind_for(&host, false).await?;

    let query: Vec<Vec<u8>> = match uid {
        Some(uid) => {
            let search = wire_protocol::query::search(Some(uid));
            Endianness::BOTH.iter().map(|e| encode(&search, *e)).collect()
        }
        None => Vec::new(),
    };

    for repeat in 0..WAKE_REPEATS {
        if repeat > 0 {
            sleep(WAKE_SEND_GAP).await;
        }
        for &port in ports {
            let dest = SocketAddr::new(host, port);
            if let Err(e) = socket.send_to(&WAKE_PACKET, dest).await {
                tracing::trace!(dest = %dest, error = %e, "Wake packet send failed");
            }
            for packet in &query {
                if let Err(e) = socket.send_to(packet, dest).await {
                    tracing::trace!(dest = %dest, error = %e, "Wake query send failed");
                }
            }
        }
    }

    Ok(())
}
