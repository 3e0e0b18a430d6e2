//! # Grinder Watch
//!
//! Directory intake for batch pipelines: watch a location for matching
//! files, claim each one exclusively by renaming it, hand it to a consumer,
//! and move it to a terminal location once the consumer is done.
//!
//! Several processors, in the same or in different processes, may watch the
//! same location. The rename is the only coordination between them, so each
//! file is processed by exactly one of them.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │     Watcher     │───▶│ Discovery Queue  │───▶│    Processor    │
//! │ (scan + notify) │    │   (unbounded)    │    │ claim/finalize  │
//! └─────────────────┘    └──────────────────┘    └─────────────────┘
//!                                                         │ ▲
//!                                                ClaimedFile Completion
//!                                                         ▼ │
//!                                                ┌─────────────────┐
//!                                                │    Consumer     │
//!                                                └─────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use grinder_watch::prelude::*;
//!
//! # async fn demo() -> grinder_watch::Result<()> {
//! let processor = Processor::for_glob("incoming/*.csv", Some("done".into()), ProcessorOptions::new())?;
//! let (port, mut consumer) = handoff::channel();
//!
//! tokio::spawn(async move {
//!     while let Some(file) = consumer.next().await {
//!         println!("processing {}", file.path.display());
//!         consumer.complete(&file).await?;
//!     }
//!     Ok::<_, grinder_watch::Error>(())
//! });
//!
//! processor.run(port).await
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod backends;
pub mod claimer;
pub mod config;
pub mod error;
pub mod finalizer;
pub mod handoff;
pub mod matcher;
pub mod orphans;
mod processor;
pub mod target;
pub mod task;
pub mod traits;
mod utils;
pub mod watcher;

pub use claimer::RenameClaimer;
pub use config::{
    CollisionPolicy, OrphanPolicy, PatternSyntax, ProcessorOptions, WatchBackend,
    DEFAULT_CLAIM_SUFFIX, DEFAULT_SCAN_INTERVAL,
};
pub use error::*;
pub use finalizer::{unique_incremented_path, Finalizer};
pub use handoff::{ClaimedFile, Completion, Consumer, HandoffPort};
pub use matcher::{ExtensionMatcher, GlobMatcher, RegexMatcher};
pub use orphans::{find_orphans, requeue_orphans, Orphan};
pub use processor::{spawn, Processor};
pub use target::{ScanSource, Terminal, WatchTarget, WorkingLocation};
pub use task::{FileTask, TaskState};
pub use traits::{ClaimOutcome, Claimer, LossReason, Matcher};
pub use utils::{ProcessorStats, StatsSnapshot};

/// Re-export common types for convenience
pub mod prelude {
    pub use crate::{
        handoff, ClaimedFile, CollisionPolicy, Consumer, Error, HandoffPort, Processor,
        ProcessorOptions, Result, WatchBackend, WatchTarget,
    };
}
