//! Legacy server node upgrade.
//!
//! Reads every node out of the legacy store, keeps the server-role ones and
//! writes a netclient config set for each of their networks:
//!
//! 1. scan the `nodes` table (fatal if unavailable or empty)
//! 2. decode each row, logging and skipping the ones that do not decode
//! 3. per server node: new traffic keys, existing WireGuard key, password
//!    cleared, traffic public key replaced
//! 4. materialize the per-network file set
//!
//! Every device is its own unit of work. Whatever happens to one device is
//! recorded in its [`DeviceReport`] and never stops the next one.
//!
//! Running the upgrade again regenerates traffic keys and overwrites every
//! file, so two runs never produce the same `traffic-*` content.

use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;

use legacy_store::{partition, scan_nodes, NodeRecord, Scan, StoreError};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::UpgradeConfig;
use crate::keys::{generate_traffic_keys_with, tunnel_private_key, KeyError};
use crate::materialize::{materialize, Artifact, ConfigLayout};

/// Errors that abort the whole upgrade.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("legacy store {} has no node records; nothing to migrate", .0.display())]
    EmptyStore(PathBuf),
    #[error("failed to create config directory {}: {source}", path.display())]
    ConfigDir { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// All four artifacts written.
    Migrated,
    /// Some artifacts were omitted or failed to write.
    Partial,
    KeyGenerationFailed,
    KeySerializationFailed,
    /// Another server node already claimed this network in this run.
    DuplicateNetwork,
}

impl DeviceStatus {
    pub fn is_failure(self) -> bool {
        !matches!(self, DeviceStatus::Migrated | DeviceStatus::Partial)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceReport {
    pub id: String,
    pub network: String,
    pub status: DeviceStatus,
    pub written: Vec<Artifact>,
    pub omitted: Vec<Artifact>,
    pub errors: Vec<String>,
}

impl DeviceReport {
    fn skipped(node: &NodeRecord, status: DeviceStatus, error: String) -> Self {
        Self {
            id: node.id.clone(),
            network: node.network.clone(),
            status,
            written: Vec::new(),
            omitted: Vec::new(),
            errors: vec![error],
        }
    }
}

/// A legacy row that did not decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeReport {
    pub store: String,
    pub config_dir: String,
    pub scanned: usize,
    pub devices: Vec<DeviceReport>,
    pub non_servers: Vec<String>,
    pub parse_failures: Vec<SkippedRow>,
}

impl UpgradeReport {
    pub fn count(&self, status: DeviceStatus) -> usize {
        self.devices.iter().filter(|d| d.status == status).count()
    }
}

/// Run the upgrade with the operating system CSPRNG.
pub fn run_upgrade(config: &UpgradeConfig) -> Result<UpgradeReport, UpgradeError> {
    run_upgrade_with(config, &mut OsRng)
}

/// Run the upgrade drawing traffic keys from `rng`.
pub fn run_upgrade_with<R>(
    config: &UpgradeConfig,
    rng: &mut R,
) -> Result<UpgradeReport, UpgradeError>
where
    R: RngCore + CryptoRng + ?Sized,
{
    info!(store = %config.store_path.display(), "retrieving legacy nodes");
    let rows = match scan_nodes(&config.store_path)? {
        Scan::Rows(rows) => rows,
        Scan::Empty => return Err(UpgradeError::EmptyStore(config.store_path.clone())),
    };

    let parsed = partition(&rows);
    let parse_failures = parsed
        .failures
        .into_iter()
        .map(|failure| {
            warn!(key = %failure.key, error = %failure.error, "skipping undecodable legacy node");
            SkippedRow {
                key: failure.key,
                reason: failure.error.to_string(),
            }
        })
        .collect();
    for id in &parsed.non_servers {
        info!(id = %id, "skipping non-server node");
    }

    let layout = ConfigLayout::new(&config.config_dir);
    info!(dir = %layout.root().display(), "creating config dir");
    layout
        .ensure_root()
        .map_err(|source| UpgradeError::ConfigDir {
            path: config.config_dir.clone(),
            source,
        })?;

    let mut claimed = BTreeSet::new();
    let mut devices = Vec::with_capacity(parsed.servers.len());
    for node in parsed.servers {
        if claimed.contains(&node.network) {
            warn!(id = %node.id, network = %node.network, "network already migrated in this run; skipping node");
            devices.push(DeviceReport::skipped(
                &node,
                DeviceStatus::DuplicateNetwork,
                format!("network {} already migrated by another server node", node.network),
            ));
            continue;
        }
        let device = migrate_node(config, &layout, node, rng);
        // Only a network that received files is taken.
        if !device.status.is_failure() {
            claimed.insert(device.network.clone());
        }
        devices.push(device);
    }

    Ok(UpgradeReport {
        store: config.store_path.display().to_string(),
        config_dir: config.config_dir.display().to_string(),
        scanned: rows.len(),
        devices,
        non_servers: parsed.non_servers,
        parse_failures,
    })
}

fn migrate_node<R>(
    config: &UpgradeConfig,
    layout: &ConfigLayout,
    mut node: NodeRecord,
    rng: &mut R,
) -> DeviceReport
where
    R: RngCore + CryptoRng + ?Sized,
{
    info!(id = %node.id, network = %node.network, "migrating server node");

    let keys = match generate_traffic_keys_with(rng).and_then(|pair| pair.encode()) {
        Ok(keys) => keys,
        Err(err) => {
            warn!(id = %node.id, error = %err, "skipping node");
            let status = match err {
                KeyError::Serialization { .. } => DeviceStatus::KeySerializationFailed,
                _ => DeviceStatus::KeyGenerationFailed,
            };
            return DeviceReport::skipped(&node, status, err.to_string());
        }
    };

    let mut errors = Vec::new();
    let tunnel_key = match tunnel_private_key(&config.store_path, &node.id) {
        Ok(Some(key)) => Some(key),
        Ok(None) => {
            warn!(id = %node.id, "no wireguard key stored for node");
            None
        }
        Err(err) => {
            warn!(id = %node.id, error = %err, "unable to retrieve wireguard key");
            errors.push(err.to_string());
            None
        }
    };

    node.password.clear();
    node.traffic_keys.mine = keys.public.clone();

    let outcome = materialize(layout, &node, &keys.private, tunnel_key.as_deref());
    for failure in &outcome.failures {
        error!(id = %node.id, artifact = %failure.artifact(), error = %failure, "saving artifact");
    }
    errors.extend(outcome.failures.iter().map(ToString::to_string));

    let status = if outcome.is_complete() {
        DeviceStatus::Migrated
    } else {
        DeviceStatus::Partial
    };
    info!(id = %node.id, network = %node.network, status = ?status, "saved node");

    DeviceReport {
        id: node.id,
        network: node.network,
        status,
        written: outcome.written,
        omitted: outcome.omitted,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use legacy_store::NodeRecord;
    use pretty_assertions::assert_eq;
    use rusqlite::{params, Connection};
    use tempfile::{tempdir, TempDir};

    use super::{run_upgrade, run_upgrade_with, DeviceStatus, UpgradeError};
    use crate::config::UpgradeConfig;
    use crate::keys::tests::{DrainedRng, FailFirstRng, FixedRng};
    use crate::materialize::Artifact;

    fn store(rows: &[(&str, &str)], keys: &[(&str, &str)]) -> (TempDir, UpgradeConfig) {
        let dir = tempdir().expect("tempdir");
        let store_path = dir.path().join("netmaker.db");
        let conn = Connection::open(&store_path).expect("db");
        conn.execute_batch(
            "CREATE TABLE nodes (key TEXT PRIMARY KEY, value TEXT);
             CREATE TABLE serverconf (key TEXT PRIMARY KEY, value TEXT);",
        )
        .expect("schema");
        for (key, value) in rows {
            conn.execute("INSERT INTO nodes VALUES (?1, ?2)", params![key, value])
                .expect("node");
        }
        for (key, value) in keys {
            conn.execute("INSERT INTO serverconf VALUES (?1, ?2)", params![key, value])
                .expect("key");
        }
        let config = UpgradeConfig {
            store_path,
            config_dir: dir.path().join("config"),
        };
        (dir, config)
    }

    fn server(id: &str, network: &str) -> String {
        format!(
            r#"{{"id":"{id}","network":"{network}","isserver":"yes","password":"hunter2","mtu":1420}}"#
        )
    }

    fn read_descriptor(dir: &Path, network: &str) -> NodeRecord {
        let raw = fs::read_to_string(dir.join(format!("netconfig-{network}"))).expect("descriptor");
        serde_yaml::from_str(&raw).expect("yaml")
    }

    #[test]
    fn migrates_server_node_with_tunnel_key() {
        let row = server("n1", "netmaker");
        let (_dir, config) = store(&[("n1", &row)], &[("n1", r#"{"PrivateKey":"wg-key"}"#)]);

        let report = run_upgrade(&config).expect("upgrade");

        assert_eq!(report.count(DeviceStatus::Migrated), 1);
        let device = &report.devices[0];
        assert_eq!(device.omitted, Vec::<Artifact>::new());
        assert_eq!(
            fs::read(config.config_dir.join("wgkey-netmaker")).expect("wgkey"),
            b"wg-key".to_vec()
        );

        let source = legacy_store::parse(row.as_bytes()).expect("source");
        let written = read_descriptor(&config.config_dir, "netmaker");
        assert_eq!(written.password, "");
        assert_eq!(written.traffic_keys.mine.len(), 32);
        assert_ne!(written.traffic_keys.mine, source.traffic_keys.mine);
        assert_eq!(written.traffic_keys.server, source.traffic_keys.server);
        assert_eq!(written.extra, source.extra);
    }

    #[test]
    fn missing_tunnel_key_gives_partial_result() {
        let row = server("n1", "lab");
        let (_dir, config) = store(&[("n1", &row)], &[]);

        let report = run_upgrade(&config).expect("upgrade");

        let device = &report.devices[0];
        assert_eq!(device.status, DeviceStatus::Partial);
        assert_eq!(device.omitted, vec![Artifact::TunnelKey]);
        assert_eq!(
            device.written,
            vec![Artifact::Secret, Artifact::TrafficKey, Artifact::Descriptor]
        );
    }

    #[test]
    fn malformed_tunnel_key_is_recorded_and_omitted() {
        let row = server("n1", "lab");
        let (_dir, config) = store(&[("n1", &row)], &[("n1", "not json")]);

        let report = run_upgrade(&config).expect("upgrade");

        let device = &report.devices[0];
        assert_eq!(device.status, DeviceStatus::Partial);
        assert_eq!(device.errors.len(), 1);
        assert!(device.errors[0].contains("malformed"));
    }

    #[test]
    fn key_generation_failure_skips_device_only() {
        let a = server("a", "net-a");
        let b = server("b", "net-b");
        let (_dir, config) = store(&[("a", &a), ("b", &b)], &[]);

        let report = run_upgrade_with(&config, &mut DrainedRng).expect("upgrade");

        assert_eq!(report.count(DeviceStatus::KeyGenerationFailed), 2);
        assert!(!config.config_dir.join("traffic-net-a").exists());
        assert!(!config.config_dir.join("netconfig-net-b").exists());
    }

    #[test]
    fn second_server_on_same_network_is_rejected() {
        let a = server("a", "shared");
        let b = server("b", "shared");
        let (_dir, config) = store(&[("a", &a), ("b", &b)], &[]);

        let report = run_upgrade(&config).expect("upgrade");

        assert_eq!(report.devices[0].status, DeviceStatus::Partial);
        assert_eq!(report.devices[1].status, DeviceStatus::DuplicateNetwork);
        assert_eq!(read_descriptor(&config.config_dir, "shared").id, "a");
    }

    #[test]
    fn failed_server_does_not_claim_its_network() {
        let a = server("a", "shared");
        let b = server("b", "shared");
        let (_dir, config) = store(&[("a", &a), ("b", &b)], &[]);

        let report = run_upgrade_with(&config, &mut FailFirstRng::default()).expect("upgrade");

        assert_eq!(report.devices[0].status, DeviceStatus::KeyGenerationFailed);
        assert_eq!(report.devices[1].status, DeviceStatus::Partial);
        assert_eq!(read_descriptor(&config.config_dir, "shared").id, "b");
    }

    #[test]
    fn degenerate_key_material_is_a_serialization_failure() {
        let row = server("n1", "lab");
        let (_dir, config) = store(&[("n1", &row)], &[]);

        let report = run_upgrade_with(&config, &mut FixedRng([0u8; 32])).expect("upgrade");

        let device = &report.devices[0];
        assert_eq!(device.status, DeviceStatus::KeySerializationFailed);
        assert!(device.written.is_empty());
        assert!(!config.config_dir.join("netconfig-lab").exists());
    }

    #[test]
    fn empty_store_is_fatal_and_writes_nothing() {
        let (_dir, config) = store(&[], &[]);

        let err = run_upgrade(&config).expect_err("empty");

        assert!(matches!(err, UpgradeError::EmptyStore(_)));
        assert!(!config.config_dir.exists());
    }

    #[test]
    fn missing_store_is_fatal() {
        let config = UpgradeConfig {
            store_path: PathBuf::from("/nonexistent/netmaker.db"),
            config_dir: PathBuf::from("/nonexistent/config"),
        };

        let err = run_upgrade(&config).expect_err("missing");
        assert!(matches!(err, UpgradeError::Store(ref e) if e.is_unavailable()));
    }
}
