//! Test network cleanup.
//!
//! End-to-end test runs leave gateways, relays and a firewall rule pair
//! behind. [`clean_network`] puts the network back into its baseline state:
//!
//! 1. list every device of the network
//! 2. remove egress/ingress gateway and relay roles wherever set
//! 3. restore ext clients to their default state
//! 4. find the `relayed` and `egress` fixture hosts by name
//! 5. drop the `OUTPUT ... -j DROP` rule each of them holds for the other
//!
//! Removal failures in steps 2 and 3 are logged and recorded but never
//! stop the run. Missing fixtures in step 4 abort before any firewall
//! command is sent.

use std::net::IpAddr;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::CleanConfig;
use crate::netmaker_api::ApiError;
use crate::remote::RemoteExecutor;

/// Host name of the fixture whose traffic goes through a relay.
pub const RELAYED_FIXTURE: &str = "relayed";
/// Host name of the fixture acting as egress gateway.
pub const EGRESS_FIXTURE: &str = "egress";

/// A node of the network together with the host it runs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub id: String,
    pub network: String,
    pub host_id: String,
    pub name: String,
    pub endpoint_ip: String,
    pub is_egress_gateway: bool,
    pub is_ingress_gateway: bool,
    /// Relay is a host-level role.
    pub is_relay: bool,
}

/// Management API operations the cleaner needs.
pub trait ManagementApi {
    fn list_devices(&self, network: &str) -> Result<Vec<Device>, ApiError>;
    fn remove_egress(&self, device: &Device) -> Result<(), ApiError>;
    fn remove_ingress(&self, device: &Device) -> Result<(), ApiError>;
    fn remove_relay(&self, device: &Device) -> Result<(), ApiError>;
    fn restore_ext_clients(&self, config: &CleanConfig) -> Result<(), ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    Egress,
    Ingress,
    Relay,
}

/// One attempted role removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleRemoval {
    pub device: String,
    pub role: RoleKind,
    pub error: Option<String>,
}

/// One attempted firewall rule removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirewallReset {
    pub host: String,
    pub command: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub network: String,
    pub devices: usize,
    pub removals: Vec<RoleRemoval>,
    pub ext_clients_error: Option<String>,
    pub firewall: Vec<FirewallReset>,
}

impl CleanReport {
    /// Count of non-fatal failures recorded during the run.
    pub fn failures(&self) -> usize {
        self.removals.iter().filter(|r| r.error.is_some()).count()
            + usize::from(self.ext_clients_error.is_some())
            + self.firewall.iter().filter(|f| f.error.is_some()).count()
    }
}

/// Fatal cleanup errors.
#[derive(Debug, Error)]
pub enum CleanError {
    #[error("failed to list devices of network {network}: {source}")]
    ListDevices { network: String, source: ApiError },
    #[error("did not find {0} netclient")]
    FixtureNotFound(&'static str),
    #[error("fixture {name} has invalid endpoint '{endpoint}'")]
    InvalidEndpoint { name: &'static str, endpoint: String },
}

/// Reset the configured network to its pre-test state.
pub fn clean_network<A, R>(
    config: &CleanConfig,
    api: &A,
    remote: &R,
) -> Result<CleanReport, CleanError>
where
    A: ManagementApi + ?Sized,
    R: RemoteExecutor + ?Sized,
{
    let devices = api
        .list_devices(&config.network)
        .map_err(|source| CleanError::ListDevices {
            network: config.network.clone(),
            source,
        })?;
    info!(network = %config.network, devices = devices.len(), "cleaning network");

    let mut report = CleanReport {
        network: config.network.clone(),
        devices: devices.len(),
        removals: Vec::new(),
        ext_clients_error: None,
        firewall: Vec::new(),
    };

    for device in &devices {
        if device.is_egress_gateway {
            report
                .removals
                .push(remove_role(device, RoleKind::Egress, || api.remove_egress(device)));
        }
        if device.is_ingress_gateway {
            report
                .removals
                .push(remove_role(device, RoleKind::Ingress, || api.remove_ingress(device)));
        }
        if device.is_relay {
            report
                .removals
                .push(remove_role(device, RoleKind::Relay, || api.remove_relay(device)));
        }
    }

    info!("resetting ext clients");
    if let Err(err) = api.restore_ext_clients(config) {
        warn!(error = %err, "failed to reset ext clients");
        report.ext_clients_error = Some(err.to_string());
    }

    let relayed = fixture_endpoint(&devices, RELAYED_FIXTURE)?;
    let egress = fixture_endpoint(&devices, EGRESS_FIXTURE)?;

    info!("resetting firewall on relayed/egress");
    for (host, peer) in [(relayed, egress), (egress, relayed)] {
        let host = host.to_string();
        let command = drop_rule_removal(peer);
        let error = remote
            .run(&config.ssh_key, &host, &command)
            .err()
            .map(|err| {
                warn!(host = %host, error = %err, "failed to remove firewall rule");
                err.to_string()
            });
        report.firewall.push(FirewallReset {
            host,
            command,
            error,
        });
    }

    Ok(report)
}

fn remove_role<F>(device: &Device, role: RoleKind, remove: F) -> RoleRemoval
where
    F: FnOnce() -> Result<(), ApiError>,
{
    info!(device = %device.name, role = ?role, "deleting role");
    let error = remove().err().map(|err| {
        warn!(device = %device.name, role = ?role, error = %err, "role removal failed");
        err.to_string()
    });
    RoleRemoval {
        device: device.name.clone(),
        role,
        error,
    }
}

fn fixture_endpoint(devices: &[Device], name: &'static str) -> Result<IpAddr, CleanError> {
    let device = devices
        .iter()
        .find(|d| d.name == name)
        .ok_or(CleanError::FixtureNotFound(name))?;

    device
        .endpoint_ip
        .trim()
        .parse()
        .map_err(|_| CleanError::InvalidEndpoint {
            name,
            endpoint: device.endpoint_ip.clone(),
        })
}

/// Command that deletes the rule dropping traffic toward `peer`.
pub fn drop_rule_removal(peer: IpAddr) -> String {
    format!("iptables -D OUTPUT -d {peer} -j DROP")
}
