//! Moving processed files to their terminal location.
//!
//! Every failure here is an integrity error: the file has been processed but
//! still sits in the working location, and the next iteration cannot tell it
//! apart from an in-flight task.

use crate::{
    claimer::strip_claim_suffix,
    config::CollisionPolicy,
    error::{Error, Result},
    target::Terminal,
    utils::fs::{is_occupied, rename_no_replace},
};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Moves or deletes files once the consumer signalled completion.
#[derive(Debug, Clone)]
pub struct Finalizer {
    terminal: Terminal,
    policy: CollisionPolicy,
    claim_suffix: Option<String>,
}

impl Finalizer {
    /// Create a finalizer for the given terminal location and policy.
    pub fn new(terminal: Terminal, policy: CollisionPolicy) -> Self {
        Self {
            terminal,
            policy,
            claim_suffix: None,
        }
    }

    /// Strip this suffix from working names before they reach the terminal
    /// location.
    pub fn with_claim_suffix(mut self, suffix: Option<String>) -> Self {
        self.claim_suffix = suffix;
        self
    }

    /// Finalize on the blocking pool. Returns the terminal path, or `None`
    /// when the file was discarded.
    pub async fn finalize(&self, working: &Path) -> Result<Option<PathBuf>> {
        let this = self.clone();
        let working = working.to_path_buf();
        tokio::task::spawn_blocking(move || this.finalize_blocking(&working))
            .await
            .map_err(|e| Error::Channel(format!("Finalize task failed: {}", e)))?
    }

    /// Finalize synchronously.
    pub fn finalize_blocking(&self, working: &Path) -> Result<Option<PathBuf>> {
        let Some(dir) = self.terminal.dir() else {
            fs::remove_file(working).map_err(|e| Error::integrity(working, e))?;
            info!("Discarded {}", working.display());
            return Ok(None);
        };

        let logical = match &self.claim_suffix {
            Some(suffix) => strip_claim_suffix(working, suffix),
            None => working.to_path_buf(),
        };
        let name = logical
            .file_name()
            .ok_or_else(|| Error::integrity(working, "no file name"))?;
        let naive = dir.join(name);

        let destination = match self.policy {
            CollisionPolicy::Overwrite => {
                clear_destination(&naive).map_err(|e| Error::integrity(&naive, e))?;
                fs::rename(working, &naive).map_err(|e| move_failed(working, &naive, e))?;
                naive
            }
            CollisionPolicy::UniqueSuffix => move_to_unique_path(working, &naive)?,
        };
        info!(
            "Finalized {} -> {} ({})",
            working.display(),
            destination.display(),
            self.policy.as_str()
        );
        Ok(Some(destination))
    }
}

/// Attempts at a unique name before giving up when other writers keep taking
/// the chosen one.
const UNIQUE_PATH_ATTEMPTS: usize = 16;

/// Move `working` to the first free name derived from `naive`. The move never
/// replaces a file, so a name taken by another processor between choosing it
/// and moving just leads to the next one.
fn move_to_unique_path(working: &Path, naive: &Path) -> Result<PathBuf> {
    for _ in 0..UNIQUE_PATH_ATTEMPTS {
        let destination = unique_incremented_path(naive).map_err(|e| Error::integrity(naive, e))?;
        match rename_no_replace(working, &destination) {
            Ok(()) => return Ok(destination),
            Err(e) if is_occupied(&e) => {
                debug!("{} was taken concurrently, retrying", destination.display());
            }
            Err(e) => return Err(move_failed(working, &destination, e)),
        }
    }
    Err(Error::integrity(
        working,
        format!("no free name next to {} after {} attempts", naive.display(), UNIQUE_PATH_ATTEMPTS),
    ))
}

fn move_failed(working: &Path, destination: &Path, e: io::Error) -> Error {
    Error::integrity(
        working,
        format!("could not move to {}: {}", destination.display(), e),
    )
}

/// Path to finalize `path` into without touching existing files.
///
/// If `path` is free it is returned unchanged. Otherwise the siblings named
/// `<name>.<digits>` are enumerated, and `<name>.<max + 1>` is returned, with
/// `max` being 0 when there are none. The directory is listed on every call;
/// nothing is cached.
pub fn unique_incremented_path(path: &Path) -> io::Result<PathBuf> {
    match fs::symlink_metadata(path) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(path.to_path_buf()),
        Err(e) => return Err(e),
    }

    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "path has no file name"))?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut prefix = name.to_os_string();
    prefix.push(".");
    let mut highest: u64 = 0;
    for entry in fs::read_dir(parent)? {
        let entry = entry?;
        let sibling = entry.file_name();
        let Some(n) = sibling
            .as_encoded_bytes()
            .strip_prefix(prefix.as_encoded_bytes())
            .filter(|rest| !rest.is_empty() && rest.iter().all(u8::is_ascii_digit))
            .and_then(|digits| std::str::from_utf8(digits).ok())
            .and_then(|digits| digits.parse::<u64>().ok())
        else {
            continue;
        };
        highest = highest.max(n);
    }

    let next = highest
        .checked_add(1)
        .ok_or_else(|| io::Error::new(ErrorKind::Other, "numeric suffix space exhausted"))?;
    debug!("{} is taken, next free suffix is {}", path.display(), next);
    let mut unique = prefix;
    unique.push(next.to_string());
    Ok(parent.join(unique))
}

fn clear_destination(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => Err(io::Error::new(
            ErrorKind::Other,
            "destination is a directory",
        )),
        Ok(_) => match fs::remove_file(path) {
            Ok(()) => {
                debug!("Removed previous {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        },
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
