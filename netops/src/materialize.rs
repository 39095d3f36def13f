//! Per-network netclient config layout.
//!
//! For a network `N` the layout under the config root is:
//!
//! | file          | content                                   |
//! |---------------|-------------------------------------------|
//! | `secret-N`    | empty placeholder for a per-network secret |
//! | `traffic-N`   | traffic private key, raw bytes            |
//! | `wgkey-N`     | WireGuard private key, when one was found |
//! | `netconfig-N` | node descriptor as YAML                   |
//!
//! Every file is created with owner-only permissions and synced to disk
//! before it is closed. Existing files are truncated and overwritten.

use std::fmt::{self, Display, Formatter};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use legacy_store::NodeRecord;
use serde::Serialize;
use thiserror::Error;

/// Permission bits for every materialized file.
pub const PRIVATE_MODE: u32 = 0o600;

/// One file of the per-network layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    Secret,
    TrafficKey,
    TunnelKey,
    Descriptor,
}

impl Artifact {
    fn file_prefix(self) -> &'static str {
        match self {
            Artifact::Secret => "secret",
            Artifact::TrafficKey => "traffic",
            Artifact::TunnelKey => "wgkey",
            Artifact::Descriptor => "netconfig",
        }
    }
}

impl Display for Artifact {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Artifact::Secret => "secret",
            Artifact::TrafficKey => "traffic_key",
            Artifact::TunnelKey => "tunnel_key",
            Artifact::Descriptor => "descriptor",
        };
        f.write_str(name)
    }
}

/// Naming scheme for the layout under one root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayout {
    root: PathBuf,
}

impl ConfigLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `artifact` for `network`.
    pub fn path(&self, artifact: Artifact, network: &str) -> PathBuf {
        self.root
            .join(format!("{}-{}", artifact.file_prefix(), network))
    }

    /// Create the root directory (and parents) if missing.
    pub fn ensure_root(&self) -> io::Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o755);
        }
        builder.create(&self.root)
    }
}

/// Failure to persist one artifact.
#[derive(Debug, Error)]
pub enum FileWriteError {
    #[error("failed to write {artifact} file {}: {source}", path.display())]
    Io {
        artifact: Artifact,
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to encode node descriptor {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

impl FileWriteError {
    pub fn artifact(&self) -> Artifact {
        match self {
            FileWriteError::Io { artifact, .. } => *artifact,
            FileWriteError::Encode { .. } => Artifact::Descriptor,
        }
    }
}

/// What happened to each artifact of one node.
#[derive(Debug, Default)]
pub struct Materialized {
    pub written: Vec<Artifact>,
    /// Artifacts with nothing to write.
    pub omitted: Vec<Artifact>,
    pub failures: Vec<FileWriteError>,
}

impl Materialized {
    pub fn is_complete(&self) -> bool {
        self.omitted.is_empty() && self.failures.is_empty()
    }

    fn record(&mut self, artifact: Artifact, result: Result<(), FileWriteError>) {
        match result {
            Ok(()) => self.written.push(artifact),
            Err(err) => self.failures.push(err),
        }
    }
}

/// Write the full file set for `node`'s network.
///
/// A failure on one artifact does not stop the others; every failure is
/// returned in [`Materialized::failures`].
pub fn materialize(
    layout: &ConfigLayout,
    node: &NodeRecord,
    traffic_private: &[u8],
    tunnel_key: Option<&[u8]>,
) -> Materialized {
    let network = node.network.as_str();
    let mut outcome = Materialized::default();

    outcome.record(
        Artifact::Secret,
        write_artifact(layout, Artifact::Secret, network, b""),
    );
    outcome.record(
        Artifact::TrafficKey,
        write_artifact(layout, Artifact::TrafficKey, network, traffic_private),
    );
    match tunnel_key {
        Some(key) => outcome.record(
            Artifact::TunnelKey,
            write_artifact(layout, Artifact::TunnelKey, network, key),
        ),
        None => outcome.omitted.push(Artifact::TunnelKey),
    }
    outcome.record(
        Artifact::Descriptor,
        write_descriptor(&layout.path(Artifact::Descriptor, network), node),
    );

    outcome
}

fn write_artifact(
    layout: &ConfigLayout,
    artifact: Artifact,
    network: &str,
    contents: &[u8],
) -> Result<(), FileWriteError> {
    let path = layout.path(artifact, network);
    write_private(&path, contents).map_err(|source| FileWriteError::Io {
        artifact,
        path,
        source,
    })
}

fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = open_private(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

fn write_descriptor(path: &Path, node: &NodeRecord) -> Result<(), FileWriteError> {
    let io_err = |source: io::Error| FileWriteError::Io {
        artifact: Artifact::Descriptor,
        path: path.to_path_buf(),
        source,
    };

    let mut writer = BufWriter::new(open_private(path).map_err(io_err)?);
    serde_yaml::to_writer(&mut writer, node).map_err(|source| FileWriteError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    let file = writer
        .into_inner()
        .map_err(|err| io_err(err.into_error()))?;
    file.sync_all().map_err(io_err)
}

fn open_private(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(PRIVATE_MODE);
    }
    let file = options.open(path)?;

    // The open mode only applies to newly created files.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(PRIVATE_MODE))?;
    }
    Ok(file)
}
