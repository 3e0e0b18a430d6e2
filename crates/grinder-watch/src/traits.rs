//! Core traits for the file intake queue.

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};

/// Decides whether a discovered entry qualifies as input.
///
/// Implementations must be pure predicates: the watcher calls them on every
/// scan and expects the same answer for the same path.
pub trait Matcher: Send + Sync + fmt::Debug {
    /// Check whether the entry at `path` should be emitted.
    fn matches(&self, path: &Path) -> bool;

    /// Human readable description used in logs.
    fn describe(&self) -> String;
}

/// Exclusive ownership capability over a discovered file.
///
/// The default backend is [`crate::RenameClaimer`], which relies on the
/// atomicity of `rename` within one volume. Other backends (a lease table,
/// for instance) can provide the same guarantee across volumes.
#[async_trait]
pub trait Claimer: Send + Sync {
    /// Get the backend identifier.
    fn backend_type(&self) -> &'static str;

    /// Attempt to take exclusive ownership of `path`.
    ///
    /// Losing a race is reported through [`ClaimOutcome::Lost`], never as an
    /// error. Exactly one of several concurrent callers observes
    /// [`ClaimOutcome::Claimed`] for the same path.
    async fn try_claim(&self, path: &Path) -> Result<ClaimOutcome>;

    /// Give up ownership of a claimed file, restoring it at `original`.
    async fn release(&self, working: &Path, original: &Path) -> Result<()>;
}

/// Result of a claim attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Ownership acquired; the file now lives at the contained path.
    Claimed(PathBuf),
    /// Another actor got there first, or the file vanished.
    Lost(LossReason),
}

impl ClaimOutcome {
    /// Check if the claim succeeded.
    pub fn is_claimed(&self) -> bool {
        matches!(self, Self::Claimed(_))
    }
}

/// Why a claim attempt did not acquire the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LossReason {
    /// The source no longer exists at the discovered path.
    SourceGone,
    /// The working location already holds a file with this name.
    DestinationOccupied,
    /// The rename failed for another reason.
    Io(std::io::ErrorKind),
}

impl fmt::Display for LossReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceGone => write!(f, "source no longer exists"),
            Self::DestinationOccupied => write!(f, "working location already occupied"),
            Self::Io(kind) => write!(f, "rename failed: {}", kind),
        }
    }
}
