use std::fs;
use std::path::PathBuf;

use legacy_store::{parse, partition, LegacyRows, ParseError, Role};
use pretty_assertions::assert_eq;

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

#[test]
fn parses_server_node_and_keeps_untyped_fields() {
    let raw = fs::read(fixture("fixtures/legacy-server-node.json")).expect("fixture");
    let node = parse(&raw).expect("parse should succeed");

    assert_eq!(node.id, "8e1f5a1c-0b7f-4c5e-9f64-2f6d1b1d7a10");
    assert_eq!(node.network, "netmaker");
    assert_eq!(node.role(), Role::Server);
    assert!(!node.password.is_empty());
    assert_eq!(node.traffic_keys.mine.len(), 32);
    assert_eq!(node.traffic_keys.server.len(), 32);
    assert_eq!(node.extra.get("listenport"), Some(&serde_json::json!(51821)));
    assert_eq!(node.extra.get("allowedips"), Some(&serde_json::Value::Null));
    assert!(!node.extra.contains_key("password"));
}

#[test]
fn rejects_non_json_and_missing_identity() {
    assert!(matches!(parse(b"not json"), Err(ParseError::Json(_))));
    assert!(matches!(
        parse(br#"{"network":"netmaker"}"#),
        Err(ParseError::Json(_))
    ));
    assert!(matches!(parse(&[0xff, 0xfe]), Err(ParseError::Json(_))));
}

#[test]
fn partition_decodes_then_filters_by_role() {
    let mut rows = LegacyRows::new();
    rows.insert(
        b"a".to_vec(),
        fs::read(fixture("fixtures/legacy-server-node.json")).expect("server fixture"),
    );
    rows.insert(
        b"b".to_vec(),
        fs::read(fixture("fixtures/legacy-client-node.json")).expect("client fixture"),
    );
    rows.insert(b"c".to_vec(), b"{\"id\": ".to_vec());

    let parsed = partition(&rows);

    assert_eq!(parsed.servers.len(), 1);
    assert_eq!(parsed.servers[0].network, "netmaker");
    assert_eq!(
        parsed.non_servers,
        vec!["c7d2e4aa-51b3-4e0f-8a3c-6d5e7f8091a2".to_string()]
    );
    assert_eq!(parsed.failures.len(), 1);
    assert_eq!(parsed.failures[0].key, "c");
}

#[test]
fn null_legacy_strings_do_not_drop_the_node() {
    let node = parse(br#"{"id":"n1","network":"net","isserver":"yes","password":null}"#)
        .expect("null password");
    assert_eq!(node.role(), Role::Server);
    assert_eq!(node.password, "");

    let node = parse(br#"{"id":"n2","network":"net","isserver":null}"#).expect("null flag");
    assert_eq!(node.role(), Role::NonServer);

    assert!(matches!(
        parse(br#"{"id":null,"network":"net"}"#),
        Err(ParseError::MissingField("id"))
    ));
}
