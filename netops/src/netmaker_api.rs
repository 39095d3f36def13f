//! Blocking client for the netmaker management API.

use std::collections::HashMap;

use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::clean::{Device, ManagementApi};
use crate::config::CleanConfig;
use crate::remote::{RemoteError, RemoteExecutor};

/// Errors from management API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Http { url: String, source: reqwest::Error },
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

#[derive(Debug, Clone, Deserialize)]
struct ApiNode {
    id: String,
    #[serde(rename = "hostid")]
    host_id: String,
    network: String,
    #[serde(rename = "isegressgateway", default)]
    is_egress_gateway: bool,
    #[serde(rename = "isingressgateway", default)]
    is_ingress_gateway: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiHost {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "endpointip", default)]
    endpoint_ip: String,
    #[serde(rename = "isrelay", default)]
    is_relay: bool,
}

/// [`ManagementApi`] over HTTP, with ext client resets done through `remote`.
pub struct HttpManagementApi<R> {
    base: String,
    master_key: String,
    client: Client,
    remote: R,
}

impl<R: RemoteExecutor> HttpManagementApi<R> {
    pub fn new(config: &CleanConfig, remote: R) -> Self {
        Self {
            base: config.api.trim_end_matches('/').to_string(),
            master_key: config.master_key.clone(),
            client: Client::new(),
            remote,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base, path)
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.master_key)
            .send()
            .map_err(|source| ApiError::Http {
                url: url.clone(),
                source,
            })?;
        check_status(&url, response)?
            .json()
            .map_err(|source| ApiError::Http { url, source })
    }

    fn delete(&self, path: &str) -> Result<(), ApiError> {
        let url = self.url(path);
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.master_key)
            .send()
            .map_err(|source| ApiError::Http {
                url: url.clone(),
                source,
            })?;
        check_status(&url, response).map(|_| ())
    }
}

fn check_status(url: &str, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(ApiError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body: response.text().unwrap_or_default(),
    })
}

impl<R: RemoteExecutor> ManagementApi for HttpManagementApi<R> {
    fn list_devices(&self, network: &str) -> Result<Vec<Device>, ApiError> {
        let nodes: Vec<ApiNode> = self.get(&format!("nodes/{network}"))?;
        let hosts: Vec<ApiHost> = self.get("hosts")?;
        Ok(join_devices(nodes, hosts))
    }

    fn remove_egress(&self, device: &Device) -> Result<(), ApiError> {
        self.delete(&format!(
            "nodes/{}/{}/deletegateway",
            device.network, device.id
        ))
    }

    fn remove_ingress(&self, device: &Device) -> Result<(), ApiError> {
        self.delete(&format!(
            "nodes/{}/{}/deleteingress",
            device.network, device.id
        ))
    }

    fn remove_relay(&self, device: &Device) -> Result<(), ApiError> {
        self.delete(&format!("hosts/{}/relay", device.host_id))
    }

    fn restore_ext_clients(&self, config: &CleanConfig) -> Result<(), ApiError> {
        let Some(host) = config.ext_client_host.as_deref() else {
            info!("no ext client host configured; nothing to reset");
            return Ok(());
        };
        let command = ext_client_reset(&config.ext_client_interface);
        self.remote.run(&config.ssh_key, host, &command)?;
        Ok(())
    }
}

/// Shell command that takes down an ext client interface and removes its conf.
pub fn ext_client_reset(interface: &str) -> String {
    format!("wg-quick down {interface}; rm -f /etc/wireguard/{interface}.conf")
}

fn join_devices(nodes: Vec<ApiNode>, hosts: Vec<ApiHost>) -> Vec<Device> {
    let hosts: HashMap<String, ApiHost> =
        hosts.into_iter().map(|h| (h.id.clone(), h)).collect();

    nodes
        .into_iter()
        .map(|node| {
            let host = hosts.get(&node.host_id);
            if host.is_none() {
                warn!(node = %node.id, host = %node.host_id, "node has no matching host");
            }
            Device {
                id: node.id,
                network: node.network,
                host_id: node.host_id,
                name: host.map(|h| h.name.clone()).unwrap_or_default(),
                endpoint_ip: host.map(|h| h.endpoint_ip.clone()).unwrap_or_default(),
                is_egress_gateway: node.is_egress_gateway,
                is_ingress_gateway: node.is_ingress_gateway,
                is_relay: host.is_some_and(|h| h.is_relay),
            }
        })
        .collect()
}
