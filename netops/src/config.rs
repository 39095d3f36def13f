use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Where the legacy server's docker volume kept its SQLite database.
pub const DEFAULT_STORE_PATH: &str = "/var/lib/docker/volumes/root_sqldata/_data/netmaker.db";
/// Root of the per-network netclient config layout.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/netclient/config";

const DEFAULT_SSH_USER: &str = "root";
const DEFAULT_EXT_CLIENT_INTERFACE: &str = "netmaker";

/// Resolved settings for one upgrade run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeConfig {
    pub store_path: PathBuf,
    pub config_dir: PathBuf,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
        }
    }
}

impl UpgradeConfig {
    /// Merge explicit overrides over the file section over the defaults.
    pub fn resolve(
        file: Option<&UpgradeSection>,
        store_path: Option<PathBuf>,
        config_dir: Option<PathBuf>,
    ) -> Self {
        let defaults = Self::default();
        let file = file.cloned().unwrap_or_default();
        Self {
            store_path: store_path.or(file.store).unwrap_or(defaults.store_path),
            config_dir: config_dir.or(file.config_dir).unwrap_or(defaults.config_dir),
        }
    }
}

/// `[upgrade]` table of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpgradeSection {
    pub store: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
}

/// Settings for cleaning a test network, from the `[clean]` table.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanConfig {
    /// Management API base URL.
    pub api: String,
    pub master_key: String,
    pub network: String,
    /// Private key used for ssh to fixture hosts.
    pub ssh_key: PathBuf,
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    #[serde(default)]
    pub ext_client_host: Option<String>,
    #[serde(default = "default_ext_client_interface")]
    pub ext_client_interface: String,
}

impl fmt::Debug for CleanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanConfig")
            .field("api", &self.api)
            .field("master_key", &"<redacted>")
            .field("network", &self.network)
            .field("ssh_key", &self.ssh_key)
            .field("ssh_user", &self.ssh_user)
            .field("ext_client_host", &self.ext_client_host)
            .field("ext_client_interface", &self.ext_client_interface)
            .finish()
    }
}

fn default_ssh_user() -> String {
    DEFAULT_SSH_USER.to_string()
}

fn default_ext_client_interface() -> String {
    DEFAULT_EXT_CLIENT_INTERFACE.to_string()
}

/// Whole config file; every table is optional until a command needs it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub upgrade: Option<UpgradeSection>,
    #[serde(default)]
    pub clean: Option<CleanConfig>,
}

/// Errors returned when loading the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("config file {path} has no [{section}] table")]
    MissingSection { path: String, section: &'static str },
}

/// Load a TOML config file.
pub fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    parse_config(&raw, path.display().to_string())
}

fn parse_config(raw: &str, path: String) -> Result<ConfigFile, ConfigError> {
    toml::from_str(raw).map_err(|source| ConfigError::Parse { path, source })
}

impl ConfigFile {
    /// Take the `[clean]` table, failing if the file has none.
    pub fn into_clean(self, path: &Path) -> Result<CleanConfig, ConfigError> {
        self.clean.ok_or_else(|| ConfigError::MissingSection {
            path: path.display().to_string(),
            section: "clean",
        })
    }
}
