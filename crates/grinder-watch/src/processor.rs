//! The watch → claim → handoff → finalize loop.

use crate::{
    claimer::RenameClaimer,
    config::ProcessorOptions,
    error::{Error, Result},
    finalizer::Finalizer,
    handoff::{ClaimedFile, HandoffPort},
    orphans,
    target::WatchTarget,
    task::FileTask,
    traits::{ClaimOutcome, Claimer},
    utils::ProcessorStats,
    watcher::Watcher,
};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What the loop does after one discovered path.
enum Flow {
    Continue,
    ConsumerGone,
}

/// File intake processor.
///
/// A background watcher feeds discovered paths into an unbounded queue. The
/// loop takes them one at a time: claim, hand off, wait for completion,
/// finalize. The next path is not even claimed before the previous one is
/// finalized, so at most one file per processor is ever in flight.
///
/// The discovery queue is unbounded. When files arrive faster than the
/// consumer completes them, every scan re-queues every unclaimed file and
/// memory grows with the backlog; the watcher logs a warning past
/// [`ProcessorOptions::backlog_warn_threshold`].
pub struct Processor {
    /// Immutable watch configuration
    target: WatchTarget,
    /// Runtime options
    options: ProcessorOptions,
    /// Claim backend
    claimer: Arc<dyn Claimer>,
    /// Terminal move/delete
    finalizer: Finalizer,
    /// Shared counters
    stats: Arc<ProcessorStats>,
}

impl Processor {
    /// Validate `target`, create its directories and deal with files left
    /// over from a previous run.
    ///
    /// Fails if the watched location does not exist or cannot be read, if
    /// the working or terminal location cannot be created, or if either lives
    /// on another volume.
    pub fn new(target: WatchTarget, options: ProcessorOptions) -> Result<Self> {
        target.validate()?;
        target.bootstrap()?;
        target.check_same_volume()?;
        orphans::reconcile(&target, options.orphans)?;

        let claimer = Arc::new(RenameClaimer::new(target.working().clone()));
        let finalizer = Finalizer::new(target.terminal().clone(), target.collision())
            .with_claim_suffix(target.claim_suffix().map(str::to_string));

        info!(
            "Processor ready: {} matching {}, collisions: {}",
            target.source().base().display(),
            target.matcher().describe(),
            target.collision().as_str()
        );

        Ok(Self {
            target,
            options,
            claimer,
            finalizer,
            stats: Arc::new(ProcessorStats::new()),
        })
    }

    /// Directory layout, see [`WatchTarget::directory`].
    pub fn for_directory(
        root: impl Into<PathBuf>,
        pattern: &str,
        options: ProcessorOptions,
    ) -> Result<Self> {
        Self::new(WatchTarget::directory(root, pattern)?, options)
    }

    /// Glob layout, see [`WatchTarget::glob`].
    pub fn for_glob(pattern: &str, out: Option<PathBuf>, options: ProcessorOptions) -> Result<Self> {
        Self::new(WatchTarget::glob(pattern, out)?, options)
    }

    /// Replace the claim backend.
    pub fn with_claimer(mut self, claimer: Arc<dyn Claimer>) -> Self {
        self.claimer = claimer;
        self
    }

    /// Shared counters, readable while the processor runs.
    pub fn stats(&self) -> Arc<ProcessorStats> {
        self.stats.clone()
    }

    /// Watch configuration.
    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    /// Run until a fatal error.
    ///
    /// Returns `Ok(())` only if the consumer goes away before accepting a
    /// file. Any `Err` is fatal (see [`Error::is_fatal`]).
    pub async fn run(self, port: HandoffPort) -> Result<()> {
        self.run_until(port, std::future::pending()).await
    }

    /// Run until a fatal error or until `shutdown` resolves.
    ///
    /// Shutdown is only honoured between files; an in-flight file is always
    /// completed and finalized first.
    pub async fn run_until<F>(self, mut port: HandoffPort, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = Watcher::new(self.target.clone(), &self.options, self.stats.clone()).spawn(tx);
        tokio::pin!(shutdown);

        loop {
            let path = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping processor");
                    watcher.abort();
                    return Ok(());
                }
                outcome = &mut watcher => return Self::watcher_finished(outcome),
                received = rx.recv() => match received {
                    Some(path) => path,
                    None => return Self::watcher_finished(watcher.await),
                },
            };
            self.stats.record_dequeued();

            match self.process(&mut port, path).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::ConsumerGone) => {
                    watcher.abort();
                    return Ok(());
                }
                Err(e) => {
                    error!("Processing stopped: {}", e);
                    watcher.abort();
                    return Err(e);
                }
            }
        }
    }

    async fn process(&self, port: &mut HandoffPort, path: PathBuf) -> Result<Flow> {
        let mut task = FileTask::discovered(path);

        let working = match self.claimer.try_claim(&task.original_path).await? {
            ClaimOutcome::Claimed(working) => working,
            ClaimOutcome::Lost(reason) => {
                task.abandon()?;
                self.stats.record_lost();
                debug!("Skipping {}: {}", task.original_path.display(), reason);
                return Ok(Flow::Continue);
            }
        };
        task.claim(working.clone())?;
        self.stats.record_claimed();

        let file = ClaimedFile {
            id: task.id,
            path: working,
            original: task.original_path.clone(),
        };
        if let Err(file) = port.deliver(file.clone()).await {
            warn!("Consumer is gone, releasing {}", file.path.display());
            self.claimer.release(&file.path, &file.original).await?;
            return Ok(Flow::ConsumerGone);
        }
        task.hand_off()?;
        debug!("Handed off {} ({})", file.path.display(), file.id);

        port.await_completion(&file, self.options.handoff_timeout).await?;

        let terminal = self.finalizer.finalize(task.working()?).await?;
        task.finalize(terminal)?;
        self.stats.record_finalized();
        Ok(Flow::Continue)
    }

    fn watcher_finished(outcome: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("Watcher stopped: {}", e);
                Err(e)
            }
            Err(e) => Err(Error::Channel(format!("Watcher task failed: {}", e))),
        }
    }
}

/// Spawn `processor` on the runtime, returning its handle and the consumer
/// end of the rendezvous.
pub fn spawn(processor: Processor) -> (JoinHandle<Result<()>>, crate::handoff::Consumer) {
    let (port, consumer) = crate::handoff::channel();
    (tokio::spawn(processor.run(port)), consumer)
}
