//! Periodic discovery of input files.
//!
//! The watcher performs a full scan of the watched location, emits every
//! matching path into the discovery queue, then sleeps for the scan interval
//! (or until the native backend reports a change). Scans are independent: a
//! file that is still there on the next scan is emitted again, so consumers
//! of the queue must tolerate duplicates and paths that vanished since.

use crate::{
    backends::NotifyTrigger,
    config::{ProcessorOptions, WatchBackend},
    error::{Error, Result},
    target::{ScanSource, WatchTarget},
    utils::ProcessorStats,
};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// Background scanner feeding the discovery queue.
pub struct Watcher {
    /// What to scan
    target: WatchTarget,
    /// Period between scans
    interval: Duration,
    /// Observation backend
    backend: WatchBackend,
    /// Queue length that triggers a backlog warning
    backlog_warn_threshold: usize,
    /// Shared counters
    stats: Arc<ProcessorStats>,
}

impl Watcher {
    /// Create a watcher for `target`.
    pub fn new(target: WatchTarget, options: &ProcessorOptions, stats: Arc<ProcessorStats>) -> Self {
        Self {
            target,
            interval: options.scan_interval,
            backend: options.backend,
            backlog_warn_threshold: options.backlog_warn_threshold,
            stats,
        }
    }

    /// Start the scan loop on the runtime.
    ///
    /// The task ends with `Ok(())` once the receiving side of the queue is
    /// dropped, and with [`Error::Scan`] when the watched location can no
    /// longer be read.
    pub fn spawn(self, tx: mpsc::UnboundedSender<PathBuf>) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(tx))
    }

    async fn run(self, tx: mpsc::UnboundedSender<PathBuf>) -> Result<()> {
        let wake = Arc::new(Notify::new());
        let _trigger = match self.backend {
            WatchBackend::Polling => None,
            WatchBackend::Notify => self.start_trigger(wake.clone()),
        };

        info!(
            "Watching {} for {} every {:?}",
            self.target.source().base().display(),
            self.target.matcher().describe(),
            self.interval
        );

        loop {
            let target = self.target.clone();
            let found = tokio::task::spawn_blocking(move || scan(&target))
                .await
                .map_err(|e| Error::Channel(format!("Scan task failed: {}", e)))??;
            self.stats.record_scan();
            debug!("Scan found {} matching file(s)", found.len());

            for path in found {
                trace!("Discovered {}", path.display());
                self.stats.record_discovered();
                if tx.send(path).is_err() {
                    debug!("Discovery queue closed, stopping watcher");
                    return Ok(());
                }
            }

            let pending = self.stats.pending();
            if pending > self.backlog_warn_threshold {
                warn!(
                    "Discovery backlog of {} paths; files are found faster than they are processed",
                    pending
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = wake.notified() => debug!("Change notification, rescanning early"),
                _ = tx.closed() => {
                    debug!("Discovery queue closed, stopping watcher");
                    return Ok(());
                }
            }
        }
    }

    fn start_trigger(&self, wake: Arc<Notify>) -> Option<NotifyTrigger> {
        let recursive = match self.target.source() {
            ScanSource::Directory { recursive, .. } => *recursive,
            ScanSource::Glob { pattern } => pattern.contains("**"),
        };
        match NotifyTrigger::start(
            &self.target.source().base(),
            recursive,
            self.target.clone(),
            wake,
        ) {
            Ok(trigger) => Some(trigger),
            Err(e) => {
                warn!("Native change notifications unavailable, polling only: {}", e);
                None
            }
        }
    }
}

/// Perform one full scan of `target`, returning matching paths in
/// enumeration order.
///
/// The working and terminal locations are never descended into, and files
/// carrying the in-place claim suffix are never returned.
pub fn scan(target: &WatchTarget) -> Result<Vec<PathBuf>> {
    let base = target.source().base();
    fs::read_dir(&base).map_err(|e| Error::scan(&base, e))?;

    let candidates = match target.source() {
        ScanSource::Directory { root, recursive } => walk_directory(target, root, *recursive)?,
        ScanSource::Glob { pattern } => evaluate_glob(pattern)?,
    };

    Ok(candidates
        .into_iter()
        .filter(|path| !target.is_excluded(path) && target.matcher().matches(path))
        .collect())
}

fn walk_directory(target: &WatchTarget, root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut found = Vec::new();
    let entries = walker
        .into_iter()
        .filter_entry(|entry| !(entry.file_type().is_dir() && target.is_excluded(entry.path())));
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(Error::scan(root, e)),
            Err(e) => {
                match e.io_error().map(|io| io.kind()) {
                    Some(ErrorKind::NotFound) => trace!("Entry vanished during scan: {}", e),
                    _ => warn!("Skipping unreadable entry: {}", e),
                }
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

fn evaluate_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob::glob(pattern).map_err(|e| Error::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;

    let mut found = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_dir() => {}
            Ok(path) => found.push(path),
            Err(e) => warn!("Skipping unreadable entry {}: {}", e.path().display(), e.error()),
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollisionPolicy;
    use crate::matcher::ExtensionMatcher;
    use crate::target::{Terminal, WorkingLocation};
    use tempfile::TempDir;

    fn write(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_directory_scan_is_recursive_and_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(&root.join("b.dat"));
        write(&root.join("a.dat"));
        write(&root.join("sub/c.dat"));
        write(&root.join("notes.txt"));

        let target = WatchTarget::directory(root, r"\.dat$").unwrap();
        let found = scan(&target).unwrap();

        assert_eq!(
            found,
            vec![root.join("a.dat"), root.join("b.dat"), root.join("sub/c.dat")]
        );
    }

    #[test]
    fn test_directory_scan_skips_working_and_terminal() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(&root.join("processing/in-flight.dat"));
        write(&root.join("processed/done.dat"));
        write(&root.join("new.dat"));

        let target = WatchTarget::directory(root, r"\.dat$").unwrap();
        assert_eq!(scan(&target).unwrap(), vec![root.join("new.dat")]);
    }

    #[test]
    fn test_non_recursive_scan() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(&root.join("top.dat"));
        write(&root.join("nested/deep.dat"));

        let target = WatchTarget::new(
            ScanSource::Directory {
                root: root.to_path_buf(),
                recursive: false,
            },
            Arc::new(ExtensionMatcher::new("dat", None).unwrap()),
            WorkingLocation::Directory(root.join("processing")),
            Terminal::Discard,
            CollisionPolicy::Overwrite,
        );
        assert_eq!(scan(&target).unwrap(), vec![root.join("top.dat")]);
    }

    #[test]
    fn test_glob_scan_skips_claimed_files() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in");
        write(&input.join("a.txt"));
        write(&input.join("b.txt.grinding"));
        write(&input.join("c.dat"));

        let pattern = format!("{}/*", input.display());
        let target = WatchTarget::glob(&pattern, None).unwrap();
        assert_eq!(
            scan(&target).unwrap(),
            vec![input.join("a.txt"), input.join("c.dat")]
        );
    }

    #[test]
    fn test_missing_root_is_a_scan_error() {
        let temp_dir = TempDir::new().unwrap();
        let target = WatchTarget::directory(temp_dir.path().join("gone"), ".*").unwrap();
        let err = scan(&target).unwrap_err();
        assert!(matches!(err, Error::Scan { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_spawned_watcher_rescans() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(&root.join("a.dat"));

        let stats = Arc::new(ProcessorStats::new());
        let options = ProcessorOptions::new().with_scan_interval(Duration::from_millis(20));
        let target = WatchTarget::directory(root, r"\.dat$").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = Watcher::new(target, &options, stats.clone()).spawn(tx);

        // The same unclaimed file is emitted on every scan.
        assert_eq!(rx.recv().await.unwrap(), root.join("a.dat"));
        assert_eq!(rx.recv().await.unwrap(), root.join("a.dat"));
        assert!(stats.snapshot().scans >= 2);

        drop(rx);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_spawned_watcher_fails_when_root_disappears() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("in");
        fs::create_dir(&root).unwrap();

        let options = ProcessorOptions::new().with_scan_interval(Duration::from_millis(10));
        let target = WatchTarget::directory(&root, ".*").unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = Watcher::new(target, &options, Arc::new(ProcessorStats::new())).spawn(tx);

        fs::remove_dir_all(&root).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(Error::Scan { .. })));
    }
}
