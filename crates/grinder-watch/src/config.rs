//! Configuration schema for the intake processor.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default period between two scans of the watched location.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(10);

/// Default suffix appended to a file claimed in place.
pub const DEFAULT_CLAIM_SUFFIX: &str = ".grinding";

/// Default number of queued discoveries before the watcher warns.
pub const DEFAULT_BACKLOG_WARN_THRESHOLD: usize = 10_000;

/// Name of the working subdirectory in directory mode.
pub const PROCESSING_DIR_NAME: &str = "processing";

/// Name of the terminal subdirectory in directory mode.
pub const PROCESSED_DIR_NAME: &str = "processed";

/// Pattern language used to select input files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatternSyntax {
    /// Shell-style wildcards matched against the full path.
    #[default]
    Glob,
    /// Regular expression searched in the base name.
    Regex,
}

/// What to do when the finalize destination is already occupied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Remove the existing destination, then move the file into place.
    Overwrite,
    /// Keep the existing destination and append the next free `.N` suffix.
    #[default]
    UniqueSuffix,
}

impl CollisionPolicy {
    /// Get a string representation of the policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::UniqueSuffix => "unique_suffix",
        }
    }
}

/// How the watcher observes the watched location.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum WatchBackend {
    /// Periodic full rescans only.
    #[default]
    Polling,
    /// Periodic rescans, plus an immediate rescan on native file system events.
    Notify,
}

/// Handling of files found in the working location at startup.
///
/// Those files were claimed by an earlier run that never finalized them.
/// `Requeue` is only safe when no other live processor shares the working
/// location.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Log each leftover file and leave it alone.
    #[default]
    Report,
    /// Move each leftover file back to its original name for rediscovery.
    Requeue,
}

/// Runtime options for a [`crate::Processor`].
#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    /// Period between two scans.
    pub scan_interval: Duration,
    /// Observation backend.
    pub backend: WatchBackend,
    /// Maximum time to wait for a completion signal. `None` waits forever.
    pub handoff_timeout: Option<Duration>,
    /// Startup handling of leftover working files.
    pub orphans: OrphanPolicy,
    /// Queue length above which the watcher logs a backlog warning.
    pub backlog_warn_threshold: usize,
}

impl ProcessorOptions {
    /// Create options with the default values.
    pub fn new() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
            backend: WatchBackend::default(),
            handoff_timeout: None,
            orphans: OrphanPolicy::default(),
            backlog_warn_threshold: DEFAULT_BACKLOG_WARN_THRESHOLD,
        }
    }

    /// Set the scan interval.
    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    /// Set the observation backend.
    pub fn with_backend(mut self, backend: WatchBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Set the handoff timeout.
    pub fn with_handoff_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handoff_timeout = timeout;
        self
    }

    /// Set the orphan policy.
    pub fn with_orphans(mut self, policy: OrphanPolicy) -> Self {
        self.orphans = policy;
        self
    }

    /// Set the backlog warning threshold.
    pub fn with_backlog_warn_threshold(mut self, threshold: usize) -> Self {
        self.backlog_warn_threshold = threshold;
        self
    }
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self::new()
    }
}
