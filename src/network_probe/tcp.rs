use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Classified TCP connect outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    Ok,
    Refused,
    Timeout,
    /// No route to host or network
    Unreachable,
    Error,
}

impl ProbeOutcome {
    pub fn is_open(&self) -> bool {
        matches!(self, ProbeOutcome::Ok)
    }

    pub(crate) fn from_io_error(e: &io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused => ProbeOutcome::Refused,
            io::ErrorKind::TimedOut => ProbeOutcome::Timeout,
            io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
                ProbeOutcome::Unreachable
            }
            _ => ProbeOutcome::Error,
        }
    }
}

/// TCP connect probe with classified outcome
pub async fn tcp_probe(addr: SocketAddr, timeout_dur: Duration) -> ProbeOutcome {
    match timeout(timeout_dur, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => ProbeOutcome::Ok,
        Ok(Err(e)) => {
            let outcome = ProbeOutcome::from_io_error(&e);
            tracing::trace!(addr = %addr, error = %e, outcome = ?outcome, "TCP probe failed");
            outcome
        }
        Err(_) => ProbeOutcome::Timeout,
    }
}
