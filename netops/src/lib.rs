//! Operator tools for netmaker server upgrades and test networks.
//!
//! Two independent pipelines live here:
//!
//! - [`upgrade`] moves server nodes out of the legacy SQLite store (read via
//!   `legacy-store`) into the per-network netclient config layout, with new
//!   traffic keys ([`keys`]) and durable owner-only files ([`materialize`]).
//! - [`clean`] resets an end-to-end test network: gateway and relay roles go
//!   away and the firewall rules between the `relayed` and `egress` fixtures
//!   are removed. It talks to the outside world through the
//!   [`clean::ManagementApi`] and [`remote::RemoteExecutor`] traits, with
//!   [`netmaker_api`] and [`remote::SshExecutor`] as the real implementations.
//!
//! Configuration is resolved once ([`config`]) and passed down explicitly.

pub mod clean;
pub mod config;
pub mod keys;
pub mod logging;
pub mod materialize;
pub mod netmaker_api;
pub mod remote;
pub mod report;
pub mod upgrade;
