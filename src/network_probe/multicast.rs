use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};

use crate::error::{Error, Result};
use crate::wire_protocol::PassiveProtocol;

/// Multicast hop limit; discovery stays on the local segment
const MULTICAST_TTL: u32 = 2;

/// Send the protocol's probes to its multicast group and collect responders
///
/// Collection runs for the whole window since responders delay their
/// replies by a random amount. Sender order is preserved, duplicates dropped.
pub async fn passive_discover(protocol: PassiveProtocol, window: Duration) -> Result<Vec<IpAddr>> {
    let group: SocketAddr = protocol
        .multicast_addr()
        .parse()
        .map_err(|_| Error::Internal(format!("invalid multicast address for {}", protocol)))?;

    let socket = UdpSocket::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)).await?;
    socket.set_multicast_ttl_v4(MULTICAST_TTL)?;

    for probe in protocol.probes() {
        socket.send_to(&probe, group).await?;
    }

    collect_responders(&socket, protocol, window).await
}

pub(crate) async fn collect_responders(
    socket: &UdpSocket,
    protocol: PassiveProtocol,
    window: Duration,
) -> Result<Vec<IpAddr>> {
    let deadline = Instant::now() + window;
    let mut found: Vec<IpAddr> = Vec::new();
    let mut buf = vec![0u8; 8192];

    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        match timeout(deadline - now, socket.recv_from(&mut buf)).await {
            Err(_) => break,
            Ok(Err(e)) => {
                tracing::debug!(protocol = %protocol, error = %e, "Multicast receive error");
            }
            Ok(Ok((n, from))) => {
                if !protocol.accepts(&buf[..n]) {
                    tracing::trace!(protocol = %protocol, from = %from, "Ignoring implausible reply");
                    continue;
                }
                if !found.contains(&from.ip()) {
                    tracing::debug!(protocol = %protocol, ip = %from.ip(), "Passive responder");
                    found.push(from.ip());
                }
            }
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collects_distinct_plausible_senders() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        responder.send_to(b"garbage", addr).await.unwrap();
        responder
            .send_to(b"HTTP/1.1 200 OK\r\nST: upnp:rootdevice\r\n\r\n", addr)
            .await
            .unwrap();
        responder
            .send_to(b"NOTIFY * HTTP/1.1\r\nNT: upnp:rootdevice\r\n\r\n", addr)
            .await
            .unwrap();

        let found = collect_responders(&listener, PassiveProtocol::Ssdp, Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(found, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_nothing_received_is_empty() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let found = collect_responders(&listener, PassiveProtocol::WsDiscovery, Duration::from_millis(100))
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}
