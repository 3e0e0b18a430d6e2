use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::PathBuf;

use crate::cli::ConfigCommands;
use crate::config::GrinderConfig;

/// Execute config subcommand
pub async fn execute(config: GrinderConfig, cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Init { path, force } => init(path, force).await,
        ConfigCommands::Show { format } => show(config, format).await,
    }
}

/// Initialize a new config file
async fn init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = path
        .or_else(|| GrinderConfig::default_config_path().ok())
        .context("Could not determine config file path")?;

    if config_path.exists() && !force {
        println!(
            "{} Config file already exists at: {}",
            "Error:".red().bold(),
            config_path.display()
        );
        println!("Use {} to overwrite", "--force".yellow());
        return Ok(());
    }

    GrinderConfig::create_example(&config_path)?;

    println!(
        "{} Created config file at: {}",
        "Success:".green().bold(),
        config_path.display()
    );
    println!(
        "\n{}",
        "Edit [source] and [consumer] before running `grind run`.".dimmed()
    );

    Ok(())
}

/// Show the current effective configuration
async fn show(config: GrinderConfig, format: String) -> Result<()> {
    let rendered = match format.as_str() {
        "json" => config.display_as_json()?,
        "toml" => config.display_as_toml()?,
        other => bail!("Unknown format '{}', expected toml or json", other),
    };
    println!("{}", rendered);
    Ok(())
}
