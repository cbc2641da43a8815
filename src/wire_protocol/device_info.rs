//! Device-info extraction
//!
//! Responses wrap identity fields as `{"value": {"<SubKey>": {...}}}`, where the
//! sub-key depends on the query type. Each known shape is a variant of
//! [`DeviceInfoResponse`], tried in a fixed priority order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::codec::Payload;

/// Identity fields reported by a camera
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub name: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub mac: Option<String>,
    pub uid: Option<String>,
    pub firmware: Option<String>,
}

/// Reply keys for each field, most specific first
const NAME_KEYS: [&str; 2] = ["name", "devName"];
const MODEL_KEYS: [&str; 2] = ["model", "type"];
const SERIAL_KEYS: [&str; 2] = ["serial", "serialNumber"];
const MAC_KEYS: [&str; 2] = ["mac", "MAC"];
const UID_KEYS: [&str; 2] = ["uid", "UID"];
const FIRMWARE_KEYS: [&str; 2] = ["firmVer", "firmware"];

/// First usable value among `keys`; numbers and booleans are stringified
fn field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

impl DeviceIdentity {
    /// Read identity fields from one reply object, ignoring unknown keys
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            name: field(map, &NAME_KEYS),
            model: field(map, &MODEL_KEYS),
            serial: field(map, &SERIAL_KEYS),
            mac: field(map, &MAC_KEYS),
            uid: field(map, &UID_KEYS),
            firmware: field(map, &FIRMWARE_KEYS),
        }
    }

    /// Whether the identity is strong enough to call the responder a camera
    pub fn is_identified(&self) -> bool {
        [&self.name, &self.serial, &self.mac]
            .iter()
            .any(|f| f.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false))
    }
}

/// Known response shapes, in extraction priority order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceInfoResponse {
    /// `GetDevInfo` reply: `value.DevInfo`
    DevInfo(DeviceIdentity),
    /// Broadcast search reply: `value.Search`
    Search(DeviceIdentity),
    /// Older firmware: `value.Device`
    Device(DeviceIdentity),
}

impl DeviceInfoResponse {
    const PRIORITY: [&'static str; 3] = ["DevInfo", "Search", "Device"];

    fn from_value_map(value: &Map<String, Value>) -> Option<Self> {
        Self::PRIORITY.iter().find_map(|key| {
            let identity = DeviceIdentity::from_map(value.get(*key)?.as_object()?);
            Some(match *key {
                "DevInfo" => DeviceInfoResponse::DevInfo(identity),
                "Search" => DeviceInfoResponse::Search(identity),
                _ => DeviceInfoResponse::Device(identity),
            })
        })
    }

    pub fn identity(&self) -> &DeviceIdentity {
        match self {
            DeviceInfoResponse::DevInfo(i)
            | DeviceInfoResponse::Search(i)
            | DeviceInfoResponse::Device(i) => i,
        }
    }

    pub fn into_identity(self) -> DeviceIdentity {
        match self {
            DeviceInfoResponse::DevInfo(i)
            | DeviceInfoResponse::Search(i)
            | DeviceInfoResponse::Device(i) => i,
        }
    }
}

/// Extract the first known device-info shape from a payload
///
/// Batch payloads are inspected command by command, in order.
pub fn extract_device_info(payload: &Payload) -> Option<DeviceInfoResponse> {
    payload.commands().into_iter().find_map(|command| {
        let value = command.get("value")?.as_object()?;
        DeviceInfoResponse::from_value_map(value)
    })
}
