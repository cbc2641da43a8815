//! Framed JSON codec
//!
//! Header layout (16 bytes, byte order varies by firmware):
//!
//! ```text
//! 0      2        4       6        8              12         16
//! | magic | version | unused | command | payload_len | reserved | JSON...
//! ```

use serde_json::{Map, Value};

/// Magic marker at the start of every header
pub const MAGIC: u16 = 0xDCBA;

/// Header length in bytes
pub const HEADER_LEN: usize = 16;

/// Reserved command value carried in every header we send
pub const COMMAND_RESERVED: u16 = 1;

/// How far into a datagram the magic marker is searched for
pub const MAGIC_SEARCH_WINDOW: usize = 64;

/// Header byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub const BOTH: [Endianness; 2] = [Endianness::Little, Endianness::Big];

    fn u16_bytes(self, v: u16) -> [u8; 2] {
        match self {
            Endianness::Little => v.to_le_bytes(),
            Endianness::Big => v.to_be_bytes(),
        }
    }

    fn u32_bytes(self, v: u32) -> [u8; 4] {
        match self {
            Endianness::Little => v.to_le_bytes(),
            Endianness::Big => v.to_be_bytes(),
        }
    }
}

/// JSON payload shapes seen in the wild
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Array of command objects
    Batch(Vec<Value>),
    /// Single command object
    Single(Map<String, Value>),
}

impl Payload {
    pub fn to_value(&self) -> Value {
        match self {
            Payload::Batch(items) => Value::Array(items.clone()),
            Payload::Single(map) => Value::Object(map.clone()),
        }
    }

    /// Classify an arbitrary JSON value; scalars are not valid payloads
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Payload::Batch(items)),
            Value::Object(map) => Some(Payload::Single(map)),
            _ => None,
        }
    }

    /// Iterate command objects regardless of shape
    pub fn commands(&self) -> Vec<&Map<String, Value>> {
        match self {
            Payload::Batch(items) => items.iter().filter_map(Value::as_object).collect(),
            Payload::Single(map) => vec![map],
        }
    }
}

/// Decoded message
#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    pub endianness: Endianness,
    pub payload: Payload,
}

impl WireMessage {
    pub fn new(endianness: Endianness, payload: Payload) -> Self {
        Self {
            endianness,
            payload,
        }
    }
}

/// Why a datagram could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("magic marker not found in first {MAGIC_SEARCH_WINDOW} bytes")]
    MagicNotFound,
    #[error("no JSON delimiter after magic marker")]
    NoPayload,
    #[error("no closing JSON delimiter")]
    Unterminated,
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),
}

/// Encode a payload with the given header byte order
pub fn encode(payload: &Payload, endianness: Endianness) -> Vec<u8> {
    // Serializing a Value cannot fail
    let json = serde_json::to_vec(&payload.to_value()).unwrap_or_default();

    let mut buf = Vec::with_capacity(HEADER_LEN + json.len());
    buf.extend_from_slice(&endianness.u16_bytes(MAGIC));
    buf.extend_from_slice(&endianness.u16_bytes(0)); // version
    buf.extend_from_slice(&endianness.u16_bytes(0)); // unused
    buf.extend_from_slice(&endianness.u16_bytes(COMMAND_RESERVED));
    buf.extend_from_slice(&endianness.u32_bytes(json.len() as u32));
    buf.extend_from_slice(&endianness.u32_bytes(0)); // reserved
    buf.extend_from_slice(&json);
    buf
}

/// Decode a datagram, returning `None` on any failure
pub fn decode(buf: &[u8]) -> Option<WireMessage> {
    try_decode(buf).ok()
}

/// Decode a datagram with the failure reason
pub fn try_decode(buf: &[u8]) -> Result<WireMessage, DecodeError> {
    let (magic_at, endianness) = find_magic(buf).ok_or(DecodeError::MagicNotFound)?;

    // Prefer a delimiter past the full header: length bytes may look like '[' or '{'
    let header_end = magic_at + HEADER_LEN;
    let after_magic = magic_at + 2;

    let mut last_err = DecodeError::NoPayload;
    let mut starts = Vec::with_capacity(2);
    if header_end < buf.len() {
        if let Some(pos) = find_open_delimiter(buf, header_end) {
            starts.push(pos);
        }
    }
    if let Some(pos) = find_open_delimiter(buf, after_magic) {
        if !starts.contains(&pos) {
            starts.push(pos);
        }
    }

    for start in starts {
        match parse_payload_at(buf, start) {
            Ok(payload) => return Ok(WireMessage::new(endianness, payload)),
            Err(e) => last_err = e,
        }
    }

    Err(last_err)
}

fn find_magic(buf: &[u8]) -> Option<(usize, Endianness)> {
    let le = MAGIC.to_le_bytes();
    let be = MAGIC.to_be_bytes();
    let limit = buf.len().min(MAGIC_SEARCH_WINDOW);

    (0..limit.saturating_sub(1)).find_map(|i| {
        let pair = [buf[i], buf[i + 1]];
        if pair == le {
            Some((i, Endianness::Little))
        } else if pair == be {
            Some((i, Endianness::Big))
        } else {
            None
        }
    })
}

fn find_open_delimiter(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .iter()
        .position(|&b| b == b'[' || b == b'{')
        .map(|p| p + from)
}

fn parse_payload_at(buf: &[u8], start: usize) -> Result<Payload, DecodeError> {
    let close = match buf[start] {
        b'[' => b']',
        _ => b'}',
    };
    let rel_end = buf[start..]
        .iter()
        .rposition(|&b| b == close)
        .ok_or(DecodeError::Unterminated)?;

    let slice = &buf[start..=start + rel_end];
    let value: Value =
        serde_json::from_slice(slice).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    Payload::from_value(value).ok_or_else(|| DecodeError::InvalidJson("not an array or object".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn single() -> Payload {
        Payload::from_value(json!({"cmd": "GetDevInfo", "code": 0, "value": {"DevInfo": {"name": "Garage"}}}))
            .unwrap()
    }

    fn batch() -> Payload {
        Payload::from_value(json!([
            {"cmd": "GetDevInfo", "action": 0, "param": {}},
            {"cmd": "Search", "param": {"uid": "95270000ABCDEFGH"}}
        ]))
        .unwrap()
    }

    #[test]
    fn test_round_trip_both_orders_both_shapes() {
        for endianness in Endianness::BOTH {
            for payload in [single(), batch()] {
                let msg = WireMessage::new(endianness, payload);
                let decoded = decode(&encode(&msg.payload, endianness)).unwrap();
                assert_eq!(decoded, msg);
            }
        }
    }

    #[test]
    fn test_header_layout() {
        let buf = encode(&single(), Endianness::Big);
        assert_eq!(&buf[0..2], &MAGIC.to_be_bytes());
        assert_eq!(&buf[2..6], &[0, 0, 0, 0]);
        assert_eq!(&buf[6..8], &COMMAND_RESERVED.to_be_bytes());
        let len = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;
        assert_eq!(len, buf.len() - HEADER_LEN);
        assert_eq!(buf[HEADER_LEN], b'{');
    }

    #[test]
    fn test_magic_at_nonzero_offset() {
        let mut buf = vec![0u8; 7];
        buf.extend(encode(&batch(), Endianness::Little));
        let decoded = decode(&buf).unwrap();
        assert_eq!(decoded.endianness, Endianness::Little);
        assert_eq!(decoded.payload, batch());
    }

    #[test]
    fn test_length_byte_that_looks_like_delimiter() {
        // 91 == b'[' lands in the length field
        let pad = "x".repeat(91 - r#"{"k":""}"#.len());
        let payload = Payload::from_value(json!({ "k": pad })).unwrap();
        let buf = encode(&payload, Endianness::Little);
        assert_eq!(buf[8], b'[');
        assert_eq!(decode(&buf).unwrap().payload, payload);
    }

    #[test]
    fn test_trailing_garbage_after_payload() {
        let mut buf = encode(&single(), Endianness::Big);
        buf.extend_from_slice(b"\0\0\0");
        assert_eq!(decode(&buf).unwrap().payload, single());
    }

    #[test]
    fn test_no_magic_is_no_message() {
        assert_eq!(try_decode(b"{\"cmd\":\"x\"}"), Err(DecodeError::MagicNotFound));
        assert!(decode(&[]).is_none());
        assert!(decode(&[0xBA]).is_none());
    }

    #[test]
    fn test_magic_outside_window_is_ignored() {
        let mut buf = vec![0u8; MAGIC_SEARCH_WINDOW + 4];
        buf.extend(encode(&single(), Endianness::Little));
        assert_eq!(try_decode(&buf), Err(DecodeError::MagicNotFound));
    }

    #[test]
    fn test_magic_without_json_is_no_message() {
        let mut buf = MAGIC.to_le_bytes().to_vec();
        buf.extend_from_slice(&[0u8; 30]);
        assert_eq!(try_decode(&buf), Err(DecodeError::NoPayload));
    }

    #[test]
    fn test_broken_json_is_no_message() {
        let mut buf = MAGIC.to_be_bytes().to_vec();
        buf.extend_from_slice(&[0u8; 14]);
        buf.extend_from_slice(b"{\"cmd\": }");
        assert!(matches!(try_decode(&buf), Err(DecodeError::InvalidJson(_))));
    }

    #[test]
    fn test_unterminated_json_is_no_message() {
        let mut buf = MAGIC.to_be_bytes().to_vec();
        buf.extend_from_slice(&[0u8; 14]);
        buf.extend_from_slice(b"[{\"cmd\": 1}");
        assert!(decode(&buf).is_none());
    }
}
