//! Files left in the working location by an earlier run.
//!
//! A processor that exits between claim and finalize leaves its file in the
//! working location, where the watcher never looks. Nothing is recovered
//! implicitly; the processor reports these files at startup and, with
//! [`OrphanPolicy::Requeue`], renames them back to where the watcher will
//! find them again.

use crate::{
    claimer::strip_claim_suffix,
    config::OrphanPolicy,
    error::{Error, Result},
    target::{ScanSource, WatchTarget, WorkingLocation},
};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};
use walkdir::WalkDir;

/// A claimed file without a live owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orphan {
    /// Where the file currently sits.
    pub working: PathBuf,
    /// Where requeueing would put it.
    pub original: PathBuf,
}

/// List orphans for `target`.
///
/// In directory mode every file in the working directory is an orphan, and
/// its original location is taken to be the scan root (subdirectory
/// information is not recorded by the claim). In place, every file carrying
/// the claim suffix whose logical name matches the target is an orphan.
pub fn find_orphans(target: &WatchTarget) -> Result<Vec<Orphan>> {
    let mut orphans = Vec::new();
    match target.working() {
        WorkingLocation::Directory(dir) => {
            if !dir.is_dir() {
                return Ok(orphans);
            }
            let base = target.source().base();
            let mut entries = fs::read_dir(dir)?
                .collect::<std::io::Result<Vec<_>>>()?;
            entries.sort_by_key(|e| e.file_name());
            for entry in entries {
                if entry.file_type()?.is_dir() {
                    continue;
                }
                orphans.push(Orphan {
                    working: entry.path(),
                    original: base.join(entry.file_name()),
                });
            }
        }
        WorkingLocation::InPlace { suffix } => {
            for working in claimed_in_place(target, suffix)? {
                let original = strip_claim_suffix(&working, suffix);
                if original != working && target.matcher().matches(&original) {
                    orphans.push(Orphan { working, original });
                }
            }
        }
    }
    Ok(orphans)
}

fn claimed_in_place(target: &WatchTarget, suffix: &str) -> Result<Vec<PathBuf>> {
    match target.source() {
        ScanSource::Glob { pattern } => {
            let claimed = format!("{}{}", pattern, glob::Pattern::escape(suffix));
            let paths = glob::glob(&claimed).map_err(|e| Error::InvalidPattern {
                pattern: claimed.clone(),
                message: e.to_string(),
            })?;
            Ok(paths
                .filter_map(|entry| entry.ok())
                .filter(|path| path.is_file() && !target.is_in_terminal(path))
                .collect())
        }
        ScanSource::Directory { root, recursive } => {
            let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name();
            if !recursive {
                walker = walker.max_depth(1);
            }
            Ok(walker
                .into_iter()
                .filter_entry(|e| !(e.file_type().is_dir() && target.is_in_terminal(e.path())))
                .filter_map(|entry| entry.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|path| {
                    path.file_name()
                        .is_some_and(|name| name.as_encoded_bytes().ends_with(suffix.as_bytes()))
                })
                .collect())
        }
    }
}

/// Rename orphans back to their original location. Orphans whose original
/// location is occupied are left alone. Returns how many were requeued.
pub fn requeue_orphans(orphans: &[Orphan]) -> Result<usize> {
    let mut requeued = 0;
    for orphan in orphans {
        if orphan.original.exists() {
            warn!(
                "Not requeueing {}: {} already exists",
                orphan.working.display(),
                orphan.original.display()
            );
            continue;
        }
        fs::rename(&orphan.working, &orphan.original)?;
        info!(
            "Requeued {} -> {}",
            orphan.working.display(),
            orphan.original.display()
        );
        requeued += 1;
    }
    Ok(requeued)
}

/// Apply `policy` to the orphans of `target`. Returns the orphans found.
pub fn reconcile(target: &WatchTarget, policy: OrphanPolicy) -> Result<Vec<Orphan>> {
    let orphans = find_orphans(target)?;
    if orphans.is_empty() {
        return Ok(orphans);
    }

    match policy {
        OrphanPolicy::Report => {
            for orphan in &orphans {
                warn!(
                    "Found unfinished file from a previous run: {}",
                    orphan.working.display()
                );
            }
        }
        OrphanPolicy::Requeue => {
            let requeued = requeue_orphans(&orphans)?;
            info!("Requeued {} of {} unfinished file(s)", requeued, orphans.len());
        }
    }
    Ok(orphans)
}
