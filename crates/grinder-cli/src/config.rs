use anyhow::{bail, Context, Result};
use grinder_watch::{
    config::{DEFAULT_BACKLOG_WARN_THRESHOLD, PROCESSED_DIR_NAME, PROCESSING_DIR_NAME},
    CollisionPolicy, OrphanPolicy, PatternSyntax, ProcessorOptions, ScanSource, Terminal,
    WatchBackend, WatchTarget, WorkingLocation, DEFAULT_CLAIM_SUFFIX,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::RunArgs;

/// How the watched location is described
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// `path` is a glob pattern; files are claimed in place
    #[default]
    Glob,
    /// `path` is a directory tree; files are claimed into `processing/`
    Directory,
}

/// Grinder configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrinderConfig {
    /// What to watch
    #[serde(default)]
    pub source: SourceConfig,
    /// Where finished files go
    #[serde(default)]
    pub output: OutputConfig,
    /// Scan and handoff behavior
    #[serde(default)]
    pub watch: WatchConfig,
    /// Command run for each file
    #[serde(default)]
    pub consumer: ConsumerConfig,
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Glob or directory, see `path`
    #[serde(default)]
    pub mode: SourceMode,

    /// Glob pattern, or root directory in directory mode
    pub path: Option<String>,

    /// File name pattern, directory mode only
    pub pattern: Option<String>,

    /// Syntax of `pattern`: regex on the file name (default), or glob on
    /// the full path
    pub syntax: Option<PatternSyntax>,

    /// Descend into subdirectories, directory mode only
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Suffix marking claimed files, glob mode only
    #[serde(default = "default_claim_suffix")]
    pub claim_suffix: String,
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for finished files. In glob mode, files are deleted when
    /// unset; in directory mode it defaults to `<root>/processed`.
    pub dir: Option<PathBuf>,

    /// Delete finished files instead of keeping them
    #[serde(default)]
    pub discard: bool,

    /// Collision policy (defaults to overwrite in directory mode and
    /// unique_suffix in glob mode)
    pub collision: Option<CollisionPolicy>,
}

/// Watch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Seconds between scans
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Change detection backend
    #[serde(default)]
    pub backend: WatchBackend,

    /// Seconds to wait for the consumer before giving up (0 = forever)
    #[serde(default)]
    pub handoff_timeout_secs: u64,

    /// What to do with files left over by an earlier run
    #[serde(default)]
    pub orphans: OrphanPolicy,

    /// Discovery backlog size that triggers a warning
    #[serde(default = "default_backlog_warn_threshold")]
    pub backlog_warn_threshold: usize,
}

/// Consumer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Program and arguments; the claimed path is appended. Files are only
    /// logged when empty.
    #[serde(default)]
    pub command: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (off, error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::default(),
            path: None,
            pattern: None,
            syntax: None,
            recursive: true,
            claim_suffix: default_claim_suffix(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            backend: WatchBackend::default(),
            handoff_timeout_secs: 0,
            orphans: OrphanPolicy::default(),
            backlog_warn_threshold: default_backlog_warn_threshold(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_claim_suffix() -> String {
    DEFAULT_CLAIM_SUFFIX.to_string()
}

fn default_interval_secs() -> u64 {
    grinder_watch::DEFAULT_SCAN_INTERVAL.as_secs()
}

fn default_backlog_warn_threshold() -> usize {
    DEFAULT_BACKLOG_WARN_THRESHOLD
}

fn default_log_level() -> String {
    "info".to_string()
}

impl GrinderConfig {
    /// Load configuration with precedence: defaults < file < env
    ///
    /// Command line overrides are applied separately with
    /// [`GrinderConfig::apply_run_args`].
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = Self::from_file_or_default(config_file)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `GRINDER_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(secs) = lookup("GRINDER_INTERVAL_SECS") {
            self.watch.interval_secs = secs
                .parse()
                .with_context(|| format!("GRINDER_INTERVAL_SECS is not a number: {}", secs))?;
        }
        if let Some(backend) = lookup("GRINDER_BACKEND") {
            self.watch.backend = parse_enum("GRINDER_BACKEND", &backend)?;
        }
        if let Some(collision) = lookup("GRINDER_COLLISION") {
            self.output.collision = Some(parse_enum("GRINDER_COLLISION", &collision)?);
        }
        Ok(())
    }

    /// Apply command line overrides (highest priority)
    pub fn apply_run_args(&mut self, args: &RunArgs) {
        if let Some(secs) = args.interval {
            self.watch.interval_secs = secs;
        }
        if let Some(collision) = args.collision {
            self.output.collision = Some(collision.into());
        }
        if let Some(backend) = args.backend {
            self.watch.backend = backend.into();
        }
        if !args.exec.is_empty() {
            self.consumer.command = args.exec.clone();
        }
    }

    /// Replace the source with a directory tree
    pub fn use_directory(&mut self, root: &Path, pattern: &str) {
        self.source.mode = SourceMode::Directory;
        self.source.path = Some(root.to_string_lossy().into_owned());
        self.source.pattern = Some(pattern.to_string());
        self.source.syntax = Some(PatternSyntax::Regex);
        self.output = OutputConfig {
            collision: self.output.collision,
            ..OutputConfig::default()
        };
    }

    /// Replace the source with a glob pattern
    pub fn use_glob(&mut self, glob: &str, out: Option<PathBuf>) {
        self.source.mode = SourceMode::Glob;
        self.source.path = Some(glob.to_string());
        self.source.pattern = None;
        self.output = OutputConfig {
            dir: out,
            discard: false,
            collision: self.output.collision,
        };
    }

    /// Build the watch target described by this configuration
    pub fn watch_target(&self) -> Result<WatchTarget> {
        let Some(path) = self.source.path.as_deref() else {
            bail!("No source configured; set [source] path or use `grind dir` / `grind glob`");
        };

        let target = match self.source.mode {
            SourceMode::Glob => {
                let matcher = grinder_watch::GlobMatcher::new(path)?;
                let terminal = match (&self.output.dir, self.output.discard) {
                    (Some(dir), false) => Terminal::Directory(dir.clone()),
                    _ => Terminal::Discard,
                };
                WatchTarget::new(
                    ScanSource::Glob {
                        pattern: path.to_string(),
                    },
                    Arc::new(matcher),
                    WorkingLocation::InPlace {
                        suffix: self.source.claim_suffix.clone(),
                    },
                    terminal,
                    self.output.collision.unwrap_or(CollisionPolicy::UniqueSuffix),
                )
            }
            SourceMode::Directory => {
                let root = PathBuf::from(path);
                let pattern = self.source.pattern.as_deref().unwrap_or(".*");
                let matcher = self
                    .source
                    .syntax
                    .unwrap_or(PatternSyntax::Regex)
                    .build(pattern)?;
                let terminal = if self.output.discard {
                    Terminal::Discard
                } else {
                    Terminal::Directory(
                        self.output
                            .dir
                            .clone()
                            .unwrap_or_else(|| root.join(PROCESSED_DIR_NAME)),
                    )
                };
                WatchTarget::new(
                    ScanSource::Directory {
                        root: root.clone(),
                        recursive: self.source.recursive,
                    },
                    matcher,
                    WorkingLocation::Directory(root.join(PROCESSING_DIR_NAME)),
                    terminal,
                    self.output.collision.unwrap_or(CollisionPolicy::Overwrite),
                )
            }
        };
        Ok(target)
    }

    /// Processor options described by this configuration
    pub fn processor_options(&self) -> ProcessorOptions {
        let handoff_timeout = match self.watch.handoff_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        ProcessorOptions::new()
            .with_scan_interval(Duration::from_secs(self.watch.interval_secs.max(1)))
            .with_backend(self.watch.backend)
            .with_handoff_timeout(handoff_timeout)
            .with_orphans(self.watch.orphans)
            .with_backlog_warn_threshold(self.watch.backlog_warn_threshold)
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("grinder");
        Ok(config_dir.join("config.toml"))
    }

    /// Create a new config file with example values
    pub fn create_example(path: &Path) -> Result<()> {
        let example = r#"# Grinder Configuration
# Location: ~/.config/grinder/config.toml

[source]
# "glob": path is a glob pattern, files are claimed in place with claim_suffix
# "directory": path is a directory tree, files are claimed into <path>/processing
mode = "glob"
path = "/data/incoming/*.csv"

# Directory mode only: file name pattern (regex unless syntax = "glob")
# pattern = '\.csv$'
# recursive = true

# claim_suffix = ".grinding"

[output]
# Finished files go here. Glob mode deletes them when unset;
# directory mode defaults to <path>/processed.
dir = "/data/done"

# "overwrite" replaces an existing file of the same name,
# "unique_suffix" keeps it and writes name.1, name.2, ...
collision = "unique_suffix"

[watch]
# Seconds between scans
interval_secs = 10

# "polling", or "notify" to rescan early on file system events
backend = "polling"

# Give up if the consumer takes longer than this (0 = wait forever)
handoff_timeout_secs = 0

# Files left in the working location by an earlier run:
# "report" logs them, "requeue" moves them back to be processed again.
# Only requeue when no other grinder shares the working location.
orphans = "report"

backlog_warn_threshold = 10000

[consumer]
# Run for each file, with the claimed path appended as the last argument.
# Files are only logged when empty.
command = ["sh", "-c", "wc -l \"$0\""]

[logging]
level = "info"
"#;

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        std::fs::write(path, example).context("Failed to write config file")?;

        Ok(())
    }

    /// Load config from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load config from file or return default
    fn from_file_or_default(config_file: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = config_file {
            return Self::from_file(&path);
        }

        // Check for test mode environment variable to skip loading user config
        if std::env::var("GRINDER_TEST_MODE").is_ok() {
            return Ok(Self::default());
        }

        match Self::default_config_path().ok().filter(|p| p.exists()) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Display the current configuration as TOML
    pub fn display_as_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config as TOML")
    }

    /// Display the current configuration as JSON
    pub fn display_as_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize config as JSON")
    }
}

fn parse_enum<T: serde::de::DeserializeOwned>(key: &str, value: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(value.replace('-', "_")))
        .with_context(|| format!("Invalid value for {}: {}", key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{BackendArg, CollisionArg};
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = GrinderConfig::default();
        assert_eq!(config.source.mode, SourceMode::Glob);
        assert_eq!(config.watch.interval_secs, 10);
        assert_eq!(config.source.claim_suffix, ".grinding");
        assert!(config.watch_target().is_err(), "no source configured");

        let options = config.processor_options();
        assert_eq!(options.scan_interval, Duration::from_secs(10));
        assert_eq!(options.handoff_timeout, None);
    }

    #[test]
    fn test_example_config_parses() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/config.toml");
        GrinderConfig::create_example(&path).unwrap();

        let config = GrinderConfig::from_file(&path).unwrap();
        assert_eq!(config.source.path.as_deref(), Some("/data/incoming/*.csv"));
        assert_eq!(config.output.collision, Some(CollisionPolicy::UniqueSuffix));
        assert_eq!(config.consumer.command.len(), 3);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: GrinderConfig = toml::from_str(
            r#"
            [source]
            mode = "directory"
            path = "/data/in"
            pattern = '\.dat$'

            [watch]
            handoff_timeout_secs = 30
            "#,
        )
        .unwrap();

        assert!(config.source.recursive);
        assert_eq!(config.watch.backend, WatchBackend::Polling);
        assert_eq!(
            config.processor_options().handoff_timeout,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GRINDER_INTERVAL_SECS", "3"),
            ("GRINDER_BACKEND", "notify"),
            ("GRINDER_COLLISION", "unique-suffix"),
        ]
        .into_iter()
        .collect();

        let mut config = GrinderConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.watch.interval_secs, 3);
        assert_eq!(config.watch.backend, WatchBackend::Notify);
        assert_eq!(config.output.collision, Some(CollisionPolicy::UniqueSuffix));
    }

    #[test]
    fn test_invalid_env_override() {
        let mut config = GrinderConfig::default();
        let result = config.apply_env(|key| (key == "GRINDER_BACKEND").then(|| "inotify".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_run_args_override_env() {
        let mut config = GrinderConfig::default();
        config
            .apply_env(|key| (key == "GRINDER_INTERVAL_SECS").then(|| "3".to_string()))
            .unwrap();
        config.apply_run_args(&RunArgs {
            interval: Some(7),
            collision: Some(CollisionArg::Overwrite),
            backend: Some(BackendArg::Notify),
            exec: vec!["cat".to_string()],
        });

        assert_eq!(config.watch.interval_secs, 7);
        assert_eq!(config.output.collision, Some(CollisionPolicy::Overwrite));
        assert_eq!(config.watch.backend, WatchBackend::Notify);
        assert_eq!(config.consumer.command, vec!["cat"]);
    }

    #[test]
    fn test_directory_target() {
        let mut config = GrinderConfig::default();
        config.use_directory(Path::new("/data/in"), r"\.dat$");
        let target = config.watch_target().unwrap();

        assert_eq!(
            target.working(),
            &WorkingLocation::Directory(PathBuf::from("/data/in/processing"))
        );
        assert_eq!(
            target.terminal(),
            &Terminal::Directory(PathBuf::from("/data/in/processed"))
        );
        assert_eq!(target.collision(), CollisionPolicy::Overwrite);
        assert!(target.matcher().matches(Path::new("/data/in/sub/x.dat")));
    }

    #[test]
    fn test_glob_target() {
        let mut config = GrinderConfig::default();
        config.output.collision = Some(CollisionPolicy::Overwrite);
        config.use_glob("/data/in/*.txt", None);
        let target = config.watch_target().unwrap();

        assert_eq!(target.claim_suffix(), Some(".grinding"));
        assert_eq!(target.terminal(), &Terminal::Discard);
        assert_eq!(target.collision(), CollisionPolicy::Overwrite);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let mut config = GrinderConfig::default();
        config.use_directory(Path::new("/data/in"), "([");
        let err = config.watch_target().unwrap_err();
        assert!(err.to_string().contains("(["));
    }

    #[test]
    fn test_display_formats() {
        let config = GrinderConfig::default();
        assert!(config.display_as_toml().unwrap().contains("[watch]"));
        assert!(config.display_as_json().unwrap().contains("\"interval_secs\": 10"));
    }
}
