//! Immutable description of what is watched and where files go.

use crate::{
    config::{CollisionPolicy, DEFAULT_CLAIM_SUFFIX, PROCESSED_DIR_NAME, PROCESSING_DIR_NAME},
    error::{Error, Result},
    matcher::{GlobMatcher, RegexMatcher},
    traits::Matcher,
    utils::fs::normalize,
};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Where the watcher looks for input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanSource {
    /// Traverse a directory tree.
    Directory {
        /// Root of the traversal.
        root: PathBuf,
        /// Whether to descend into subdirectories.
        recursive: bool,
    },
    /// Evaluate a glob pattern.
    Glob {
        /// Glob pattern, evaluated on every scan.
        pattern: String,
    },
}

impl ScanSource {
    /// Directory the source is rooted at.
    ///
    /// For a glob this is the longest leading run of components without
    /// wildcards, or `.` when the pattern starts with one.
    pub fn base(&self) -> PathBuf {
        match self {
            Self::Directory { root, .. } => root.clone(),
            Self::Glob { pattern } => glob_base(pattern),
        }
    }
}

/// Where claimed files live while they are being processed.
///
/// The claim is a rename, so the working location must be on the same volume
/// as the watched files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkingLocation {
    /// Move claimed files into this directory, keeping their base name.
    Directory(PathBuf),
    /// Rename claimed files next to themselves by appending `suffix`.
    InPlace {
        /// Suffix marking a file as claimed.
        suffix: String,
    },
}

/// Where finalized files end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// Move finalized files into this directory.
    Directory(PathBuf),
    /// Delete finalized files.
    Discard,
}

impl Terminal {
    /// Terminal directory, if files are kept.
    pub fn dir(&self) -> Option<&Path> {
        match self {
            Self::Directory(dir) => Some(dir),
            Self::Discard => None,
        }
    }
}

/// Complete, immutable watch configuration.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    source: ScanSource,
    matcher: Arc<dyn Matcher>,
    working: WorkingLocation,
    terminal: Terminal,
    collision: CollisionPolicy,
}

impl WatchTarget {
    /// Assemble a target from its parts.
    pub fn new(
        source: ScanSource,
        matcher: Arc<dyn Matcher>,
        working: WorkingLocation,
        terminal: Terminal,
        collision: CollisionPolicy,
    ) -> Self {
        Self {
            source,
            matcher,
            working,
            terminal,
            collision,
        }
    }

    /// Directory layout: scan `root` recursively for base names matching the
    /// regular expression `pattern`, claim into `root/processing`, finalize
    /// into `root/processed`, overwriting collisions.
    pub fn directory(root: impl Into<PathBuf>, pattern: &str) -> Result<Self> {
        let matcher = RegexMatcher::new(pattern)?;
        let root = root.into();
        Ok(Self::new(
            ScanSource::Directory {
                root: root.clone(),
                recursive: true,
            },
            Arc::new(matcher),
            WorkingLocation::Directory(root.join(PROCESSING_DIR_NAME)),
            Terminal::Directory(root.join(PROCESSED_DIR_NAME)),
            CollisionPolicy::Overwrite,
        ))
    }

    /// Glob layout: evaluate `pattern`, claim in place with the `.grinding`
    /// suffix, finalize into `out` with unique suffixes, or discard when `out`
    /// is `None`.
    pub fn glob(pattern: &str, out: Option<PathBuf>) -> Result<Self> {
        let matcher = GlobMatcher::new(pattern)?;
        Ok(Self::new(
            ScanSource::Glob {
                pattern: pattern.to_string(),
            },
            Arc::new(matcher),
            WorkingLocation::InPlace {
                suffix: DEFAULT_CLAIM_SUFFIX.to_string(),
            },
            out.map_or(Terminal::Discard, Terminal::Directory),
            CollisionPolicy::UniqueSuffix,
        ))
    }

    /// Replace the collision policy.
    pub fn with_collision(mut self, collision: CollisionPolicy) -> Self {
        self.collision = collision;
        self
    }

    /// Replace the terminal location.
    pub fn with_terminal(mut self, terminal: Terminal) -> Self {
        self.terminal = terminal;
        self
    }

    /// Scan source.
    pub fn source(&self) -> &ScanSource {
        &self.source
    }

    /// Input matcher.
    pub fn matcher(&self) -> &Arc<dyn Matcher> {
        &self.matcher
    }

    /// Working location.
    pub fn working(&self) -> &WorkingLocation {
        &self.working
    }

    /// Terminal location.
    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    /// Collision policy applied by the finalizer.
    pub fn collision(&self) -> CollisionPolicy {
        self.collision
    }

    /// Suffix marking in-place claims, if claims happen in place.
    pub fn claim_suffix(&self) -> Option<&str> {
        match &self.working {
            WorkingLocation::InPlace { suffix } => Some(suffix),
            WorkingLocation::Directory(_) => None,
        }
    }

    /// Whether `path` belongs to the queue's own bookkeeping and must never be
    /// treated as new input.
    ///
    /// Paths are compared after normalization, so `./out` as the terminal
    /// directory excludes `out/a.txt` returned by a scan.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let cwd = std::env::current_dir().ok();
        let path_normalized = normalize(path, cwd.as_deref());
        let under = |dir: &Path| path_normalized.starts_with(normalize(dir, cwd.as_deref()));

        if let WorkingLocation::Directory(dir) = &self.working {
            if under(dir.as_path()) {
                return true;
            }
        }
        if self.terminal.dir().is_some_and(under) {
            return true;
        }
        match self.claim_suffix() {
            Some(suffix) => path
                .file_name()
                .is_some_and(|name| name.as_encoded_bytes().ends_with(suffix.as_bytes())),
            None => false,
        }
    }

    /// Whether `path` lies in the terminal directory.
    pub(crate) fn is_in_terminal(&self, path: &Path) -> bool {
        let cwd = std::env::current_dir().ok();
        self.terminal.dir().is_some_and(|dir| {
            normalize(path, cwd.as_deref()).starts_with(normalize(dir, cwd.as_deref()))
        })
    }

    /// Check that the watched location exists and can be read.
    pub(crate) fn validate(&self) -> Result<()> {
        let base = self.source.base();
        if !base.is_dir() {
            return Err(Error::Config(format!(
                "The directory to watch does not exist: {}",
                base.display()
            )));
        }
        fs::read_dir(&base).map_err(|e| {
            Error::Config(format!(
                "The directory to watch is not readable: {}: {}",
                base.display(),
                e
            ))
        })?;

        if let WorkingLocation::InPlace { suffix } = &self.working {
            if suffix.is_empty() || suffix.contains(std::path::MAIN_SEPARATOR) {
                return Err(Error::Config(format!("Invalid claim suffix '{}'", suffix)));
            }
        }

        Ok(())
    }

    /// Create the working and terminal directories. Idempotent.
    pub(crate) fn bootstrap(&self) -> Result<()> {
        if let WorkingLocation::Directory(dir) = &self.working {
            fs::create_dir_all(dir)?;
            debug!("Working directory ready: {}", dir.display());
        }
        if let Some(dir) = self.terminal.dir() {
            fs::create_dir_all(dir)?;
            debug!("Terminal directory ready: {}", dir.display());
        }
        Ok(())
    }

    /// Refuse layouts where a claim or finalize rename would cross volumes.
    #[cfg(unix)]
    pub(crate) fn check_same_volume(&self) -> Result<()> {
        use std::os::unix::fs::MetadataExt;

        let base = self.source.base();
        let device = fs::metadata(&base)?.dev();

        let working = match &self.working {
            WorkingLocation::Directory(dir) => Some(dir.as_path()),
            WorkingLocation::InPlace { .. } => None,
        };
        for dir in working.into_iter().chain(self.terminal.dir()) {
            if fs::metadata(dir)?.dev() != device {
                return Err(Error::Config(format!(
                    "{} is not on the same volume as {}; files are moved by rename",
                    dir.display(),
                    base.display()
                )));
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub(crate) fn check_same_volume(&self) -> Result<()> {
        Ok(())
    }
}

fn glob_base(pattern: &str) -> PathBuf {
    let mut base = PathBuf::new();
    for component in Path::new(pattern).components() {
        if let Component::Normal(part) = component {
            if part.to_string_lossy().contains(['*', '?', '[']) {
                break;
            }
        }
        base.push(component);
    }

    // The last literal component of a pattern without wildcards is the file
    // itself, not a directory.
    if base == Path::new(pattern) {
        base.pop();
    }
    if base.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        base
    }
}
