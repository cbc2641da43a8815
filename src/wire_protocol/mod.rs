//! WireProtocol - discovery/control message codec
//!
//! ## Responsibilities
//!
//! - Vendor framed-JSON protocol: 16-byte header + JSON payload, both byte orders
//! - Tolerant decoding of datagrams from unknown firmware
//! - Normalized device-info extraction from the different response shapes
//! - WS-Discovery and SSDP probe construction

mod codec;
mod device_info;
mod passive;
pub mod query;

pub use codec::{
    decode, encode, try_decode, DecodeError, Endianness, Payload, WireMessage, COMMAND_RESERVED,
    HEADER_LEN, MAGIC, MAGIC_SEARCH_WINDOW,
};
pub use device_info::{extract_device_info, DeviceIdentity, DeviceInfoResponse};
pub use passive::{
    is_probe_match, is_ssdp_response, ssdp_search_requests, ws_discovery_probe, PassiveProtocol,
    SSDP_MULTICAST_ADDR, WS_DISCOVERY_MULTICAST_ADDR,
};
