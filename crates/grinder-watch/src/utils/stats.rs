//! Counters shared between the watcher and the processing loop.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Live counters for one processor.
///
/// Updated with relaxed atomics; read them through [`ProcessorStats::snapshot`].
#[derive(Debug, Default)]
pub struct ProcessorStats {
    /// Completed scans of the watched location
    scans: AtomicU64,
    /// Paths emitted by the watcher
    discovered: AtomicU64,
    /// Successful claims
    claimed: AtomicU64,
    /// Claims lost to another actor
    lost: AtomicU64,
    /// Files moved to the terminal location or discarded
    finalized: AtomicU64,
    /// Paths queued but not yet taken by the loop
    pending: AtomicUsize,
}

impl ProcessorStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discovered(&self) {
        self.discovered.fetch_add(1, Ordering::Relaxed);
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dequeued(&self) {
        // Saturating: the loop never takes more than the watcher queued.
        let _ = self
            .pending
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub(crate) fn record_claimed(&self) {
        self.claimed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lost(&self) {
        self.lost.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_finalized(&self) {
        self.finalized.fetch_add(1, Ordering::Relaxed);
    }

    /// Current length of the discovery queue.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Get a point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            scans: self.scans.load(Ordering::Relaxed),
            discovered: self.discovered.load(Ordering::Relaxed),
            claimed: self.claimed.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
            finalized: self.finalized.load(Ordering::Relaxed),
            pending: self.pending(),
        }
    }
}

/// Point-in-time copy of [`ProcessorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Completed scans
    pub scans: u64,
    /// Paths emitted by the watcher
    pub discovered: u64,
    /// Successful claims
    pub claimed: u64,
    /// Lost claims
    pub lost: u64,
    /// Finalized files
    pub finalized: u64,
    /// Current queue length
    pub pending: usize,
}
