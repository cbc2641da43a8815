//! Query payload builders for the vendor protocol

use serde_json::json;

use super::codec::Payload;

/// `GetDevInfo` query (batch form, as sent by the vendor client)
pub fn device_info() -> Payload {
    Payload::Batch(vec![json!({
        "cmd": "GetDevInfo",
        "action": 0,
        "param": {}
    })])
}

/// Broadcast search; addresses a specific device when its uid is known
pub fn search(uid: Option<&str>) -> Payload {
    let param = match uid {
        Some(uid) => json!({ "uid": uid }),
        None => json!({}),
    };
    let mut map = serde_json::Map::new();
    map.insert("cmd".into(), json!("Search"));
    map.insert("action".into(), json!(0));
    map.insert("param".into(), param);
    Payload::Single(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_carries_uid() {
        let Payload::Single(map) = search(Some("95270000ABCD")) else {
            panic!("search must be a single object");
        };
        assert_eq!(map["param"]["uid"], "95270000ABCD");
        assert_eq!(map["cmd"], "Search");
    }

    #[test]
    fn test_device_info_is_batch() {
        assert!(matches!(device_info(), Payload::Batch(ref v) if v.len() == 1));
    }
}
