//! Rename-based claiming.
//!
//! A file is claimed by moving it into the working location without ever
//! replacing an existing name. The move is atomic within one volume, so when
//! several watchers (threads or separate processes) race for the same file
//! exactly one succeeds, and every other attempt finds either the source gone
//! or the destination taken. No lock service is involved.

use crate::{
    error::{Error, Result},
    target::WorkingLocation,
    traits::{ClaimOutcome, Claimer, LossReason},
    utils::fs::{is_occupied, rename_no_replace},
};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Claims files with an atomic rename into the working location.
#[derive(Debug, Clone)]
pub struct RenameClaimer {
    working: WorkingLocation,
}

impl RenameClaimer {
    /// Create a claimer for the given working location.
    pub fn new(working: WorkingLocation) -> Self {
        Self { working }
    }

    /// Path `path` would be renamed to when claimed.
    pub fn destination(&self, path: &Path) -> Option<PathBuf> {
        let name = path.file_name()?;
        Some(match &self.working {
            WorkingLocation::Directory(dir) => dir.join(name),
            WorkingLocation::InPlace { suffix } => {
                let mut claimed = path.as_os_str().to_os_string();
                claimed.push(suffix);
                PathBuf::from(claimed)
            }
        })
    }
}

#[async_trait]
impl Claimer for RenameClaimer {
    fn backend_type(&self) -> &'static str {
        "rename"
    }

    async fn try_claim(&self, path: &Path) -> Result<ClaimOutcome> {
        let destination = self.destination(path).ok_or_else(|| {
            Error::Config(format!("Cannot claim a path without a file name: {}", path.display()))
        })?;

        match move_no_replace(path, &destination).await? {
            Ok(()) => {
                info!("Claimed {} -> {}", path.display(), destination.display());
                Ok(ClaimOutcome::Claimed(destination))
            }
            Err(e) if is_occupied(&e) => {
                warn!(
                    "Not claiming {}: {} already exists",
                    path.display(),
                    destination.display()
                );
                Ok(ClaimOutcome::Lost(LossReason::DestinationOccupied))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Somebody else got {} first", path.display());
                Ok(ClaimOutcome::Lost(LossReason::SourceGone))
            }
            Err(e) => {
                warn!("Could not claim {}: {}", path.display(), e);
                Ok(ClaimOutcome::Lost(LossReason::Io(e.kind())))
            }
        }
    }

    async fn release(&self, working: &Path, original: &Path) -> Result<()> {
        match move_no_replace(working, original).await? {
            Ok(()) => {
                info!("Released {} -> {}", working.display(), original.display());
                Ok(())
            }
            Err(e) if is_occupied(&e) => Err(Error::integrity(
                working,
                format!("cannot release, {} is occupied", original.display()),
            )),
            Err(e) => Err(Error::integrity(working, e)),
        }
    }
}

async fn move_no_replace(from: &Path, to: &Path) -> Result<std::io::Result<()>> {
    let (from, to) = (from.to_path_buf(), to.to_path_buf());
    tokio::task::spawn_blocking(move || rename_no_replace(&from, &to))
        .await
        .map_err(|e| Error::Channel(format!("Rename task failed: {}", e)))
}

/// Logical path of a file claimed in place: `a.txt.grinding` becomes `a.txt`.
///
/// Paths without the suffix are returned unchanged.
pub fn strip_claim_suffix(path: &Path, suffix: &str) -> PathBuf {
    let Some(name) = path.file_name() else {
        return path.to_path_buf();
    };
    match strip_os_suffix(name, suffix) {
        Some(stripped) if !stripped.is_empty() => path.with_file_name(stripped),
        _ => path.to_path_buf(),
    }
}

/// `name` without the trailing `suffix`, compared byte-wise so names that are
/// not valid UTF-8 are handled too.
#[cfg(unix)]
fn strip_os_suffix<'a>(name: &'a OsStr, suffix: &str) -> Option<&'a OsStr> {
    use std::os::unix::ffi::OsStrExt;

    name.as_bytes()
        .strip_suffix(suffix.as_bytes())
        .map(OsStr::from_bytes)
}

#[cfg(not(unix))]
fn strip_os_suffix<'a>(name: &'a OsStr, suffix: &str) -> Option<&'a OsStr> {
    name.to_str()?.strip_suffix(suffix).map(OsStr::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn in_place() -> RenameClaimer {
        RenameClaimer::new(WorkingLocation::InPlace {
            suffix: ".grinding".to_string(),
        })
    }

    #[test]
    fn test_destination() {
        let claimer = in_place();
        assert_eq!(
            claimer.destination(Path::new("/in/a.txt")),
            Some(PathBuf::from("/in/a.txt.grinding"))
        );

        let claimer = RenameClaimer::new(WorkingLocation::Directory(PathBuf::from("/in/processing")));
        assert_eq!(
            claimer.destination(Path::new("/in/sub/a.txt")),
            Some(PathBuf::from("/in/processing/a.txt"))
        );
    }

    #[test]
    fn test_strip_claim_suffix() {
        assert_eq!(
            strip_claim_suffix(Path::new("tmp.in/a.txt.grinding"), ".grinding"),
            PathBuf::from("tmp.in/a.txt")
        );
        assert_eq!(
            strip_claim_suffix(Path::new("tmp.in/a.txt"), ".grinding"),
            PathBuf::from("tmp.in/a.txt")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_strip_claim_suffix_non_utf8() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        let name = OsString::from_vec(b"r\xe9sum\xe9.txt.grinding".to_vec());
        let stripped = strip_claim_suffix(&Path::new("in").join(name), ".grinding");
        assert_eq!(
            stripped,
            Path::new("in").join(OsString::from_vec(b"r\xe9sum\xe9.txt".to_vec()))
        );
    }

    #[tokio::test]
    async fn test_claim_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, "hello").unwrap();

        let outcome = in_place().try_claim(&file).await.unwrap();
        let claimed = temp_dir.path().join("a.txt.grinding");
        assert_eq!(outcome, ClaimOutcome::Claimed(claimed.clone()));
        assert!(!file.exists());
        assert_eq!(fs::read_to_string(claimed).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_claim_missing_source_is_lost() {
        let temp_dir = TempDir::new().unwrap();
        let outcome = in_place()
            .try_claim(&temp_dir.path().join("gone.txt"))
            .await
            .unwrap();
        assert_eq!(outcome, ClaimOutcome::Lost(LossReason::SourceGone));
    }

    #[tokio::test]
    async fn test_claim_refuses_occupied_destination() {
        let temp_dir = TempDir::new().unwrap();
        let processing = temp_dir.path().join("processing");
        fs::create_dir(&processing).unwrap();
        fs::write(processing.join("a.txt"), "in flight").unwrap();
        fs::write(temp_dir.path().join("a.txt"), "new").unwrap();

        let claimer = RenameClaimer::new(WorkingLocation::Directory(processing.clone()));
        let outcome = claimer.try_claim(&temp_dir.path().join("a.txt")).await.unwrap();

        assert_eq!(outcome, ClaimOutcome::Lost(LossReason::DestinationOccupied));
        assert_eq!(fs::read_to_string(processing.join("a.txt")).unwrap(), "in flight");
        assert!(temp_dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_release_refuses_occupied_original() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("a.txt");
        let working = temp_dir.path().join("a.txt.grinding");
        fs::write(&original, "newer").unwrap();
        fs::write(&working, "claimed").unwrap();

        let err = in_place().release(&working, &original).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(fs::read_to_string(&original).unwrap(), "newer");
        assert_eq!(fs::read_to_string(&working).unwrap(), "claimed");
    }

    #[tokio::test]
    async fn test_release_restores_original() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, "hello").unwrap();

        let claimer = in_place();
        let ClaimOutcome::Claimed(working) = claimer.try_claim(&file).await.unwrap() else {
            panic!("expected claim to succeed");
        };
        claimer.release(&working, &file).await.unwrap();

        assert!(file.exists());
        assert!(!working.exists());
    }
}
