use anyhow::{Context, Result};
use netops::config::{load_config_file, UpgradeConfig};
use netops::report::render_upgrade_text;
use netops::upgrade::run_upgrade;

use crate::cli::{OutputFormat, UpgradeArgs};

pub fn run(args: UpgradeArgs) -> Result<()> {
    let file = match &args.config {
        Some(path) => Some(
            load_config_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
        ),
        None => None,
    };
    let config = UpgradeConfig::resolve(
        file.as_ref().and_then(|f| f.upgrade.as_ref()),
        args.store,
        args.config_dir,
    );

    let report = run_upgrade(&config).context("upgrade aborted")?;

    match args.format {
        OutputFormat::Text => println!("{}", render_upgrade_text(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}
