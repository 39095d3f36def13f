//! Read-only access to the legacy netmaker SQLite store.
//!
//! The legacy server kept every node as a JSON document in the `value`
//! column of a `nodes(key, value)` table, and each server node's WireGuard
//! private key in a separate `serverconf(key, value)` table keyed by node id.
//! This crate knows how to get those rows out and turn them into typed
//! [`NodeRecord`] values. Deciding what to do with them is left to callers.
//!
//! Reading is split in two stages so that format problems and business rules
//! can be tested separately:
//!
//! 1. [`reader`] scans raw rows (`key -> bytes`) without interpreting them.
//! 2. [`parser`] decodes each value and filters to server-role nodes.
//!
//! ```ignore
//! use legacy_store::{partition, scan_nodes, Scan};
//!
//! let rows = match scan_nodes(path)? {
//!     Scan::Rows(rows) => rows,
//!     Scan::Empty => return Err("nothing to migrate".into()),
//! };
//! let parsed = partition(&rows);
//! for node in parsed.servers {
//!     println!("{} on {}", node.id, node.network);
//! }
//! ```

pub mod parser;
pub mod reader;
pub mod record;

pub use parser::{parse, partition, ParseError, ParsedRows, RowFailure};
pub use reader::{lookup_tunnel_key, scan_nodes, LegacyRows, LegacyStore, Scan, StoreError};
pub use record::{NodeRecord, Role, TrafficKeys};
