use clap::{Args, Parser, Subcommand, ValueEnum};
use grinder_watch::{CollisionPolicy, WatchBackend};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

/// Log level options for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    Off,
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages (default)
    Info,
    /// Debug messages
    Debug,
    /// Trace-level messages (most verbose)
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// What to do when the terminal name is already taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CollisionArg {
    /// Replace the existing file
    Overwrite,
    /// Keep the existing file and append the next free numeric suffix
    UniqueSuffix,
}

impl From<CollisionArg> for CollisionPolicy {
    fn from(arg: CollisionArg) -> Self {
        match arg {
            CollisionArg::Overwrite => CollisionPolicy::Overwrite,
            CollisionArg::UniqueSuffix => CollisionPolicy::UniqueSuffix,
        }
    }
}

/// How new files are noticed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    /// Periodic scans only
    Polling,
    /// Periodic scans, woken early by native change notifications
    Notify,
}

impl From<BackendArg> for WatchBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Polling => WatchBackend::Polling,
            BackendArg::Notify => WatchBackend::Notify,
        }
    }
}

#[derive(Parser)]
#[command(name = "grind")]
#[command(about = "grind - claim files from a directory one at a time and hand them to a command")]
#[command(version)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Set log level (off, error, warn, info, debug, trace)
    /// If not specified, uses config file value or defaults to 'info'
    #[arg(short = 'l', long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose logging (shortcut for --log-level=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (defaults to ~/.config/grinder/config.toml)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,
}

/// Options shared by every command that runs a processor
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Seconds between scans (overrides config file)
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Collision policy for the terminal directory (overrides config file)
    #[arg(long, value_enum)]
    pub collision: Option<CollisionArg>,

    /// Change detection backend (overrides config file)
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Command to run for each file; the claimed path is appended as the
    /// last argument
    #[arg(long, num_args = 1.., allow_hyphen_values = true, value_name = "CMD")]
    pub exec: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the processor described by the configuration file
    Run(RunArgs),

    /// Watch a directory tree for files whose name matches a regular expression
    ///
    /// Claimed files move to ROOT/processing, finished files to ROOT/processed.
    Dir {
        /// Directory to watch
        root: PathBuf,

        /// Regular expression matched against file names
        #[arg(short, long, default_value = ".*")]
        pattern: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Watch a glob pattern, claiming files in place
    ///
    /// Claimed files are renamed with a `.grinding` suffix. Finished files
    /// move to --out, or are deleted when it is omitted.
    Glob {
        /// Glob pattern, quoted so the shell does not expand it
        glob: String,

        /// Directory for finished files
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// List files left in the working location by an earlier run
    Orphans {
        /// Move them back so they are picked up again
        #[arg(long)]
        requeue: bool,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize a new config file
    Init {
        /// Path for the config file (defaults to ~/.config/grinder/config.toml)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite existing config file
        #[arg(short = 'F', long)]
        force: bool,
    },

    /// Show the current effective configuration
    Show {
        /// Output format (toml, json)
        #[arg(short = 'f', long, default_value = "toml")]
        format: String,
    },
}
