//! Lifecycle of a single discovered file.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Lifecycle state of a [`FileTask`].
///
/// ```text
/// Discovered -> Claimed -> HandedOff -> Finalized
///      \-> Abandoned
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// A matching entry was seen by the watcher.
    Discovered,
    /// The entry was moved into the working location.
    Claimed,
    /// The working path was delivered to the consumer.
    HandedOff,
    /// The file reached its terminal location or was deleted.
    Finalized,
    /// The claim was lost to another actor.
    Abandoned,
}

impl TaskState {
    /// Get a string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Claimed => "claimed",
            Self::HandedOff => "handed_off",
            Self::Finalized => "finalized",
            Self::Abandoned => "abandoned",
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Abandoned)
    }
}

/// One file's journey through the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileTask {
    /// Unique identifier, also used to scope the completion signal.
    pub id: Uuid,
    /// Path at which the watcher found the file.
    pub original_path: PathBuf,
    /// Path inside the working location, once claimed.
    pub working_path: Option<PathBuf>,
    /// Final resting place, once finalized. `None` after a discard.
    pub terminal_path: Option<PathBuf>,
    /// When the watcher emitted the path.
    pub discovered_at: DateTime<Utc>,
    state: TaskState,
}

impl FileTask {
    /// Create a task for a freshly discovered path.
    pub fn discovered(path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_path: path,
            working_path: None,
            terminal_path: None,
            discovered_at: Utc::now(),
            state: TaskState::Discovered,
        }
    }

    /// Current state.
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Base name of the original file.
    pub fn file_name(&self) -> Option<&std::ffi::OsStr> {
        self.original_path.file_name()
    }

    /// Record a successful claim.
    pub fn claim(&mut self, working: PathBuf) -> Result<()> {
        self.advance(TaskState::Discovered, TaskState::Claimed)?;
        self.working_path = Some(working);
        Ok(())
    }

    /// Record a lost claim race.
    pub fn abandon(&mut self) -> Result<()> {
        self.advance(TaskState::Discovered, TaskState::Abandoned)
    }

    /// Record delivery to the consumer.
    pub fn hand_off(&mut self) -> Result<()> {
        self.advance(TaskState::Claimed, TaskState::HandedOff)
    }

    /// Record the terminal move, or a discard when `terminal` is `None`.
    pub fn finalize(&mut self, terminal: Option<PathBuf>) -> Result<()> {
        self.advance(TaskState::HandedOff, TaskState::Finalized)?;
        self.terminal_path = terminal;
        Ok(())
    }

    /// Working path, required once the task is claimed.
    pub fn working(&self) -> Result<&Path> {
        self.working_path
            .as_deref()
            .ok_or(Error::InvalidTransition {
                from: self.state.as_str(),
                to: TaskState::HandedOff.as_str(),
            })
    }

    fn advance(&mut self, expected: TaskState, next: TaskState) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidTransition {
                from: self.state.as_str(),
                to: next.as_str(),
            });
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut task = FileTask::discovered(PathBuf::from("/in/a.txt"));
        assert_eq!(task.state(), TaskState::Discovered);

        task.claim(PathBuf::from("/in/a.txt.grinding")).unwrap();
        task.hand_off().unwrap();
        task.finalize(Some(PathBuf::from("/out/a.txt"))).unwrap();

        assert_eq!(task.state(), TaskState::Finalized);
        assert!(task.state().is_terminal());
        assert_eq!(task.terminal_path, Some(PathBuf::from("/out/a.txt")));
    }

    #[test]
    fn test_abandon_only_from_discovered() {
        let mut task = FileTask::discovered(PathBuf::from("/in/a.txt"));
        task.abandon().unwrap();
        assert_eq!(task.state(), TaskState::Abandoned);

        let err = task.claim(PathBuf::from("/in/a.txt.grinding")).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: "abandoned",
                to: "claimed"
            }
        ));
    }

    #[test]
    fn test_cannot_skip_handoff() {
        let mut task = FileTask::discovered(PathBuf::from("/in/a.txt"));
        task.claim(PathBuf::from("/work/a.txt")).unwrap();

        assert!(task.finalize(None).is_err());
        assert_eq!(task.state(), TaskState::Claimed);
        assert!(task.terminal_path.is_none());
    }

    #[test]
    fn test_working_path_requires_claim() {
        let task = FileTask::discovered(PathBuf::from("/in/a.txt"));
        assert!(task.working().is_err());
    }
}
