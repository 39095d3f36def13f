use thiserror::Error;

use crate::reader::LegacyRows;
use crate::record::NodeRecord;

/// Errors that can occur while decoding a legacy node value.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The value is not a JSON node document.
    #[error("failed to decode legacy node: {0}")]
    Json(#[from] serde_json::Error),
    /// A required identifying field is empty.
    #[error("legacy node has an empty '{0}' field")]
    MissingField(&'static str),
    /// The network name cannot be used as a file name component.
    #[error("legacy node network '{0}' is not a safe file name")]
    UnsafeNetwork(String),
}

/// A row that failed to decode.
#[derive(Debug)]
pub struct RowFailure {
    /// Row key, lossily rendered as text.
    pub key: String,
    pub error: ParseError,
}

/// Rows split by decode outcome and role.
#[derive(Debug, Default)]
pub struct ParsedRows {
    /// Decoded server-role nodes, in row key order.
    pub servers: Vec<NodeRecord>,
    /// Ids of decoded nodes that are not server-role.
    pub non_servers: Vec<String>,
    /// Rows that did not decode.
    pub failures: Vec<RowFailure>,
}

/// Decode one legacy node value.
pub fn parse(raw: &[u8]) -> Result<NodeRecord, ParseError> {
    let node: NodeRecord = serde_json::from_slice(raw)?;

    if node.id.trim().is_empty() {
        return Err(ParseError::MissingField("id"));
    }
    if node.network.trim().is_empty() {
        return Err(ParseError::MissingField("network"));
    }
    if !is_safe_component(&node.network) {
        return Err(ParseError::UnsafeNetwork(node.network));
    }

    Ok(node)
}

/// Decode every row, then keep only server-role nodes.
///
/// A row that fails to decode never affects its siblings.
pub fn partition(rows: &LegacyRows) -> ParsedRows {
    let mut parsed = ParsedRows::default();

    for (key, value) in rows {
        match parse(value) {
            Ok(node) if node.is_server() => parsed.servers.push(node),
            Ok(node) => parsed.non_servers.push(node.id),
            Err(error) => parsed.failures.push(RowFailure {
                key: String::from_utf8_lossy(key).into_owned(),
                error,
            }),
        }
    }

    parsed
}

// Network names end up in file names under the config root.
fn is_safe_component(name: &str) -> bool {
    name != "."
        && name != ".."
        && !name
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::{parse, ParseError};

    #[test]
    fn rejects_path_like_network_names() {
        for network in ["..", "a/b", "..\\x", "."] {
            let raw = format!(r#"{{"id":"n1","network":{}}}"#, serde_json::json!(network));
            let err = parse(raw.as_bytes()).expect_err("unsafe network");
            assert!(matches!(err, ParseError::UnsafeNetwork(_)), "{network}");
        }
    }

    #[test]
    fn rejects_blank_identifiers() {
        let err = parse(br#"{"id":"  ","network":"net"}"#).expect_err("blank id");
        assert!(matches!(err, ParseError::MissingField("id")));

        let err = parse(br#"{"id":"n1","network":""}"#).expect_err("blank network");
        assert!(matches!(err, ParseError::MissingField("network")));
    }
}
