use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Value the legacy server stored in `isserver` for server nodes.
pub const SERVER_FLAG: &str = "yes";

/// Whether a node was run by the legacy server itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    NonServer,
}

/// A legacy node document.
///
/// Only the fields the upgrade touches are typed. Everything else is kept
/// in [`NodeRecord::extra`] so a record written back out carries the same
/// content it was read with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(deserialize_with = "null_as_empty")]
    pub id: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub network: String,
    #[serde(rename = "isserver", default, deserialize_with = "null_as_empty")]
    pub server_flag: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub password: String,
    #[serde(rename = "traffickeys", default)]
    pub traffic_keys: TrafficKeys,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl NodeRecord {
    pub fn role(&self) -> Role {
        if self.server_flag == SERVER_FLAG {
            Role::Server
        } else {
            Role::NonServer
        }
    }

    pub fn is_server(&self) -> bool {
        self.role() == Role::Server
    }
}

/// Message-encryption keys. `mine` is this node's public key, `server` is
/// the peer (server) public key.
///
/// Legacy rows hold the keys as base64 text. They are written back out as
/// plain byte sequences, the shape netclient reads from its descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficKeys {
    #[serde(default, deserialize_with = "key_bytes::deserialize")]
    pub mine: Vec<u8>,
    #[serde(default, deserialize_with = "key_bytes::deserialize")]
    pub server: Vec<u8>,
}

// Legacy string fields may hold `null`.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Key bytes from base64 text or a byte sequence; `null` reads as empty.
mod key_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Encoded {
        Text(String),
        Bytes(Vec<u8>),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<Encoded>::deserialize(deserializer)? {
            Some(Encoded::Text(text)) => STANDARD.decode(text).map_err(serde::de::Error::custom),
            Some(Encoded::Bytes(bytes)) => Ok(bytes),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{NodeRecord, Role, TrafficKeys};

    #[test]
    fn role_requires_exact_server_flag() {
        let mut node: NodeRecord =
            serde_json::from_str(r#"{"id":"n1","network":"net","isserver":"yes"}"#)
                .expect("decode");
        assert_eq!(node.role(), Role::Server);

        node.server_flag = "YES".to_string();
        assert_eq!(node.role(), Role::NonServer);

        node.server_flag.clear();
        assert!(!node.is_server());
    }

    #[test]
    fn null_traffic_keys_decode_as_empty() {
        let node: NodeRecord = serde_json::from_str(
            r#"{"id":"n1","network":"net","traffickeys":{"mine":null,"server":"AQID"}}"#,
        )
        .expect("decode");
        assert!(node.traffic_keys.mine.is_empty());
        assert_eq!(node.traffic_keys.server, vec![1, 2, 3]);
    }

    #[test]
    fn null_string_fields_decode_as_empty() {
        let node: NodeRecord = serde_json::from_str(
            r#"{"id":"n1","network":"net","isserver":null,"password":null}"#,
        )
        .expect("decode");
        assert_eq!(node.server_flag, "");
        assert_eq!(node.password, "");
        assert_eq!(node.role(), Role::NonServer);
    }

    #[test]
    fn traffic_keys_write_as_byte_sequences() {
        let node: NodeRecord = serde_json::from_str(
            r#"{"id":"n1","network":"net","traffickeys":{"mine":"AQID","server":null}}"#,
        )
        .expect("decode");

        let written = serde_json::to_value(&node.traffic_keys).expect("encode");
        assert_eq!(written, serde_json::json!({"mine": [1, 2, 3], "server": []}));

        let reread: TrafficKeys = serde_json::from_value(written).expect("reread");
        assert_eq!(reread, node.traffic_keys);
    }
}
