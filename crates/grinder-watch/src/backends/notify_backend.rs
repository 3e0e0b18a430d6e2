//! Notify-based scan trigger.

use crate::{error::Result, target::WatchTarget};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Wakes the watcher when the operating system reports a change under the
/// scan base. Dropping the trigger stops the native watcher.
pub struct NotifyTrigger {
    /// Native watcher, kept alive for the lifetime of the trigger
    _watcher: RecommendedWatcher,
    /// Watched directory
    path: PathBuf,
}

impl NotifyTrigger {
    /// Start watching `path`, calling `wake.notify_one()` on every relevant
    /// event. Bursts coalesce into a single pending wake-up.
    pub fn start(path: &Path, recursive: bool, target: WatchTarget, wake: Arc<Notify>) -> Result<Self> {
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    if Self::is_relevant(&event, &target) {
                        debug!("Change detected: {:?} {:?}", event.kind, event.paths);
                        wake.notify_one();
                    }
                }
                Err(e) => warn!("Notify error: {}", e),
            }
        })?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(path, mode)?;
        info!("Native change notifications enabled for {}", path.display());

        Ok(Self {
            _watcher: watcher,
            path: path.to_path_buf(),
        })
    }

    /// Watched directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Only a path that appears or changes can produce new work. Removals,
    /// metadata changes and the old side of a rename never do, and new paths
    /// inside the working and terminal locations are our own bookkeeping.
    fn is_relevant(event: &Event, target: &WatchTarget) -> bool {
        let new_paths: &[PathBuf] = match event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::From) | ModifyKind::Metadata(_)) => {
                return false
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                event.paths.get(1..).unwrap_or(&[])
            }
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any => &event.paths,
            _ => return false,
        };
        new_paths.iter().any(|p| !target.is_excluded(p))
    }
}

impl std::fmt::Debug for NotifyTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyTrigger").field("path", &self.path).finish()
    }
}
