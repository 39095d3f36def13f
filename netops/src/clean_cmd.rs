use anyhow::{Context, Result};
use netops::clean::clean_network;
use netops::config::load_config_file;
use netops::netmaker_api::HttpManagementApi;
use netops::remote::SshExecutor;
use netops::report::render_clean_text;

use crate::cli::{CleanArgs, OutputFormat};

pub fn run(args: CleanArgs) -> Result<()> {
    let mut config = load_config_file(&args.config)
        .and_then(|file| file.into_clean(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if let Some(network) = args.network {
        config.network = network;
    }

    let ssh = SshExecutor::new(config.ssh_user.clone());
    let api = HttpManagementApi::new(&config, ssh.clone());

    let report = clean_network(&config, &api, &ssh).context("clean aborted")?;

    match args.format {
        OutputFormat::Text => println!("{}", render_clean_text(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}
