//! Scan range parsing

use std::net::{IpAddr, Ipv4Addr};

use crate::error::{Error, Result};

/// Largest sweep accepted (a /16)
pub const MAX_SCAN_HOSTS: u64 = 65_536;

/// Usable host addresses of a CIDR range, in ascending order
///
/// Network and broadcast addresses are excluded; `/31` and `/32` yield
/// their addresses as-is. A bare address is a one-host range.
pub fn enumerate_hosts(range: &str) -> Result<Vec<IpAddr>> {
    let range = range.trim();

    let Some((base, prefix)) = range.split_once('/') else {
        return range
            .parse::<IpAddr>()
            .map(|ip| vec![ip])
            .map_err(|e| Error::Validation(format!("Invalid IP '{}': {}", range, e)));
    };

    let base_ip: Ipv4Addr = base
        .trim()
        .parse()
        .map_err(|e| Error::Validation(format!("Invalid IPv4 network '{}': {}", base, e)))?;
    let prefix: u8 = prefix
        .trim()
        .parse()
        .map_err(|e| Error::Validation(format!("Invalid prefix '{}': {}", prefix, e)))?;

    if prefix > 32 {
        return Err(Error::Validation(format!(
            "Invalid prefix: {} (must be 0-32)",
            prefix
        )));
    }

    let size = 1u64 << (32 - prefix);
    if size > MAX_SCAN_HOSTS {
        return Err(Error::Validation(format!(
            "Range /{} is too large (max {} addresses)",
            prefix, MAX_SCAN_HOSTS
        )));
    }

    let mask = if prefix == 0 {
        0
    } else {
        !((1u32 << (32 - prefix)) - 1)
    };
    let network = u32::from(base_ip) & mask;
    let broadcast = network | !mask;

    let (start, end) = if prefix >= 31 {
        (network, broadcast)
    } else {
        (network + 1, broadcast - 1)
    };

    Ok((start..=end)
        .map(|ip| IpAddr::V4(Ipv4Addr::from(ip)))
        .collect())
}
