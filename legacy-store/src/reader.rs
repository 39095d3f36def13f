use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};
use thiserror::Error;

/// Table holding one JSON document per legacy node.
pub const NODES_TABLE: &str = "nodes";
/// Table holding server WireGuard key blobs keyed by node id.
pub const SERVER_CONF_TABLE: &str = "serverconf";

/// Raw legacy rows keyed by the raw row key bytes.
pub type LegacyRows = BTreeMap<Vec<u8>, Vec<u8>>;

/// Outcome of a full scan of the nodes table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    /// The table exists but holds no rows.
    Empty,
    /// At least one row was read.
    Rows(LegacyRows),
}

/// Errors raised while reading the legacy store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be opened or is busy/locked/not a database.
    #[error("legacy store {path} is unavailable: {source}")]
    Unavailable {
        path: String,
        source: rusqlite::Error,
    },
    /// The database opened but the expected table is absent.
    #[error("legacy store {path} is unavailable: table '{table}' not found")]
    MissingTable { path: String, table: &'static str },
    /// A query against an existing table failed.
    #[error("query on '{table}' in {path} failed: {source}")]
    QueryFailed {
        path: String,
        table: &'static str,
        source: rusqlite::Error,
    },
}

impl StoreError {
    /// True for the "store cannot be used at all" family of errors.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable { .. } | StoreError::MissingTable { .. }
        )
    }
}

/// A read-only handle on the legacy database.
///
/// The connection is closed when the handle is dropped, so holding it in a
/// local scope releases it on every return path.
#[derive(Debug)]
pub struct LegacyStore {
    conn: Connection,
    path: PathBuf,
}

impl LegacyStore {
    /// Open `path` read-only. A missing file is an error, never created.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|source| {
            StoreError::Unavailable {
                path: path.display().to_string(),
                source,
            }
        })?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Read every row of the nodes table.
    pub fn scan(&self) -> Result<Scan, StoreError> {
        self.ensure_table(NODES_TABLE)?;

        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM nodes")
            .map_err(|source| self.classify(NODES_TABLE, source))?;
        let mut rows = stmt
            .query([])
            .map_err(|source| self.classify(NODES_TABLE, source))?;

        let mut records = LegacyRows::new();
        while let Some(row) = rows
            .next()
            .map_err(|source| self.classify(NODES_TABLE, source))?
        {
            let key = row
                .get_ref(0)
                .map_err(|source| self.classify(NODES_TABLE, source))?;
            let value = row
                .get_ref(1)
                .map_err(|source| self.classify(NODES_TABLE, source))?;
            records.insert(value_bytes(key), value_bytes(value));
        }

        if records.is_empty() {
            return Ok(Scan::Empty);
        }
        Ok(Scan::Rows(records))
    }

    /// Fetch the raw serverconf blob for one device, if a row exists.
    pub fn tunnel_key_blob(&self, device_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.ensure_table(SERVER_CONF_TABLE)?;

        self.conn
            .query_row(
                "SELECT value FROM serverconf WHERE key = ?1",
                params![device_id],
                |row| row.get_ref(0).map(value_bytes),
            )
            .optional()
            .map_err(|source| self.classify(SERVER_CONF_TABLE, source))
    }

    fn ensure_table(&self, table: &'static str) -> Result<(), StoreError> {
        let exists: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                params![table],
                |row| row.get(0),
            )
            .map_err(|source| self.classify(table, source))?;

        if !exists {
            return Err(StoreError::MissingTable {
                path: self.path.display().to_string(),
                table,
            });
        }
        Ok(())
    }

    fn classify(&self, table: &'static str, source: rusqlite::Error) -> StoreError {
        let path = self.path.display().to_string();
        match &source {
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(
                    err.code,
                    ErrorCode::DatabaseBusy
                        | ErrorCode::DatabaseLocked
                        | ErrorCode::NotADatabase
                        | ErrorCode::CannotOpen
                ) =>
            {
                StoreError::Unavailable { path, source }
            }
            _ => StoreError::QueryFailed {
                path,
                table,
                source,
            },
        }
    }
}

/// Open the store, scan the nodes table and release the handle.
pub fn scan_nodes(path: &Path) -> Result<Scan, StoreError> {
    let store = LegacyStore::open(path)?;
    store.scan()
}

/// Open a fresh handle and look up one device's serverconf blob.
pub fn lookup_tunnel_key(path: &Path, device_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
    let store = LegacyStore::open(path)?;
    store.tunnel_key_blob(device_id)
}

// Legacy columns are untyped; accept whatever storage class SQLite hands back.
fn value_bytes(value: ValueRef<'_>) -> Vec<u8> {
    match value {
        ValueRef::Null => Vec::new(),
        ValueRef::Integer(i) => i.to_string().into_bytes(),
        ValueRef::Real(f) => f.to_string().into_bytes(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => bytes.to_vec(),
    }
}
