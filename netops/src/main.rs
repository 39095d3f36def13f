use anyhow::Result;
use clap::Parser;
use netops::logging::{init_logging, LogFormat};

mod clean_cmd;
mod cli;
mod upgrade_cmd;

use cli::{Cli, Command, LogFormatArg};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(log_format(cli.log_format))?;

    match cli.command {
        Command::Upgrade(args) => upgrade_cmd::run(args),
        Command::Clean(args) => clean_cmd::run(args),
    }
}

fn log_format(format: LogFormatArg) -> LogFormat {
    match format {
        LogFormatArg::Json => LogFormat::Json,
        LogFormatArg::Text => LogFormat::Text,
    }
}
