//! Passive discovery probes (WS-Discovery, SSDP)
//!
//! Only the responder address is used; bodies are checked for plausibility.

use std::fmt;

/// WS-Discovery multicast group
pub const WS_DISCOVERY_MULTICAST_ADDR: &str = "239.255.255.250:3702";

/// SSDP multicast group
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250:1900";

/// Passive discovery protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassiveProtocol {
    WsDiscovery,
    Ssdp,
}

impl PassiveProtocol {
    pub fn multicast_addr(&self) -> &'static str {
        match self {
            PassiveProtocol::WsDiscovery => WS_DISCOVERY_MULTICAST_ADDR,
            PassiveProtocol::Ssdp => SSDP_MULTICAST_ADDR,
        }
    }

    /// Probe datagrams to send
    pub fn probes(&self) -> Vec<Vec<u8>> {
        match self {
            PassiveProtocol::WsDiscovery => vec![ws_discovery_probe().into_bytes()],
            PassiveProtocol::Ssdp => ssdp_search_requests()
                .into_iter()
                .map(String::into_bytes)
                .collect(),
        }
    }

    /// Whether a response body is plausible for this protocol
    pub fn accepts(&self, body: &[u8]) -> bool {
        let text = String::from_utf8_lossy(body);
        match self {
            PassiveProtocol::WsDiscovery => is_probe_match(&text),
            PassiveProtocol::Ssdp => is_ssdp_response(&text),
        }
    }
}

impl fmt::Display for PassiveProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassiveProtocol::WsDiscovery => f.write_str("ws-discovery"),
            PassiveProtocol::Ssdp => f.write_str("ssdp"),
        }
    }
}

/// WS-Discovery Probe envelope for network video transmitters
pub fn ws_discovery_probe() -> String {
    let message_id = uuid::Uuid::new_v4();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing"
            xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery"
            xmlns:dn="http://www.onvif.org/ver10/network/wsdl">
  <s:Header>
    <a:Action s:mustUnderstand="1">http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe</a:Action>
    <a:MessageID>uuid:{}</a:MessageID>
    <a:ReplyTo><a:Address>http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous</a:Address></a:ReplyTo>
    <a:To s:mustUnderstand="1">urn:schemas-xmlsoap-org:ws:2005:04:discovery</a:To>
  </s:Header>
  <s:Body>
    <d:Probe><d:Types>dn:NetworkVideoTransmitter</d:Types></d:Probe>
  </s:Body>
</s:Envelope>"#,
        message_id
    )
}

/// SSDP M-SEARCH requests
pub fn ssdp_search_requests() -> Vec<String> {
    ["ssdp:all", "upnp:rootdevice"]
        .iter()
        .map(|st| {
            format!(
                "M-SEARCH * HTTP/1.1\r\n\
                 HOST: {}\r\n\
                 MAN: \"ssdp:discover\"\r\n\
                 MX: 1\r\n\
                 ST: {}\r\n\r\n",
                SSDP_MULTICAST_ADDR, st
            )
        })
        .collect()
}

/// WS-Discovery ProbeMatches response (namespace-prefix agnostic)
pub fn is_probe_match(body: &str) -> bool {
    body.contains("ProbeMatch")
}

/// SSDP search response or NOTIFY announcement
pub fn is_ssdp_response(body: &str) -> bool {
    let first = body.lines().next().unwrap_or("").to_ascii_uppercase();
    first.starts_with("HTTP/1.1 200") || first.starts_with("NOTIFY ")
}
