//! Error types for the file intake queue.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while watching, claiming and finalizing files.
#[derive(Error, Debug)]
pub enum Error {
    /// The file pattern could not be compiled.
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        /// Pattern as supplied by the caller.
        pattern: String,
        /// Compiler diagnostic.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The watched location could not be scanned.
    #[error("Scan of '{path}' failed: {message}")]
    Scan {
        /// Location being scanned.
        path: PathBuf,
        /// Underlying failure.
        message: String,
    },

    /// A claimed file could not be finalized. The working location may no
    /// longer reflect one file per in-flight task.
    #[error("Integrity error on '{path}': {message}")]
    Integrity {
        /// File that could not be moved or removed.
        path: PathBuf,
        /// Underlying failure.
        message: String,
    },

    /// The consumer broke the handoff protocol.
    #[error("Handoff error: {0}")]
    Handoff(String),

    /// The consumer did not signal completion in time.
    #[error("No completion for '{path}' after {waited_ms}ms")]
    HandoffTimeout {
        /// Working path of the in-flight file.
        path: PathBuf,
        /// How long the processor waited.
        waited_ms: u64,
    },

    /// A task was moved out of order through its lifecycle.
    #[error("Invalid task transition from {from} to {to}")]
    InvalidTransition {
        /// State the task was in.
        from: &'static str,
        /// State that was requested.
        to: &'static str,
    },

    /// Native file system notification error.
    #[error("File watching error: {0}")]
    Watch(String),

    /// Channel error.
    #[error("Channel error: {0}")]
    Channel(String),
}

impl Error {
    /// Whether the processor must stop after this error.
    ///
    /// Fatal errors mean the working location can no longer be trusted or
    /// the watched location cannot be observed; the hosting process is
    /// expected to terminate.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Scan { .. }
                | Error::Integrity { .. }
                | Error::Handoff(_)
                | Error::HandoffTimeout { .. }
        )
    }

    pub(crate) fn integrity(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Error::Integrity {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn scan(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Error::Scan {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for file intake operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Convert notify errors to our error type.
impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Error::Watch(err.to_string())
    }
}
