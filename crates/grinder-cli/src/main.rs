use anyhow::Result;
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use grinder_cli::{
    cli::{Cli, Commands},
    commands, config,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration with CLI overrides
    let mut config = config::GrinderConfig::load(cli.config)?;

    // Initialize logging: RUST_LOG wins, then flags, then the config file
    let level = match (cli.log_level, cli.verbose) {
        (Some(level), _) => LevelFilter::from(level),
        (None, true) => LevelFilter::DEBUG,
        (None, false) => config.logging.level.parse().unwrap_or(LevelFilter::INFO),
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "grind={level},grinder_cli={level},grinder_watch={level}",
            level = level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Run(args) => {
            config.apply_run_args(&args);
            commands::run::execute(config).await?
        }

        Commands::Dir { root, pattern, run } => {
            config.use_directory(&root, &pattern);
            config.apply_run_args(&run);
            commands::run::execute(config).await?
        }

        Commands::Glob { glob, out, run } => {
            config.use_glob(&glob, out);
            config.apply_run_args(&run);
            commands::run::execute(config).await?
        }

        Commands::Orphans { requeue } => commands::orphans::execute(config, requeue).await?,

        Commands::Config(cmd) => commands::config::execute(config, cmd).await?,
    }

    Ok(())
}
