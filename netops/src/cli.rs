use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "netops")]
#[command(about = "Upgrade legacy server node configs and clean up test networks")]
pub struct Cli {
    /// Log line format on stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Json)]
    pub log_format: LogFormatArg,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Migrate server nodes from the legacy store into the netclient config layout.
    Upgrade(UpgradeArgs),
    /// Remove gateways, relays and firewall rules left behind by test runs.
    Clean(CleanArgs),
}

#[derive(Parser, Debug)]
pub struct UpgradeArgs {
    /// Optional TOML config file (reads the [upgrade] table).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Legacy SQLite database.
    #[arg(long, env = "NETOPS_STORE")]
    pub store: Option<PathBuf>,
    /// Directory receiving the per-network config files.
    #[arg(long, env = "NETOPS_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,
    /// Report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// TOML config file with a [clean] table.
    #[arg(long)]
    pub config: PathBuf,
    /// Override the network named in the config file.
    #[arg(long)]
    pub network: Option<String>,
    /// Report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum LogFormatArg {
    Json,
    Text,
}
