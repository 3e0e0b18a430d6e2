//! Single-slot rendezvous between the processor and its consumer.
//!
//! The processor delivers one claimed file, then blocks until the consumer
//! reports completion for that same file. Both directions are capacity-1
//! channels, so at most one file is ever in flight per processor.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A file handed to the consumer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimedFile {
    /// Task identifier; echo it back through [`Consumer::complete`].
    pub id: Uuid,
    /// Where the file lives while it is being processed.
    pub path: PathBuf,
    /// Where the watcher found it.
    pub original: PathBuf,
}

/// Completion signal scoped to one task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Completion {
    /// Identifier of the completed task.
    pub id: Uuid,
}

/// Create a connected processor port and consumer.
pub fn channel() -> (HandoffPort, Consumer) {
    let (file_tx, file_rx) = mpsc::channel(1);
    let (done_tx, done_rx) = mpsc::channel(1);
    (
        HandoffPort::from_channels(file_tx, done_rx),
        Consumer {
            files: file_rx,
            completions: done_tx,
        },
    )
}

/// Processor side of the rendezvous.
#[derive(Debug)]
pub struct HandoffPort {
    files: mpsc::Sender<ClaimedFile>,
    completions: mpsc::Receiver<Completion>,
}

impl HandoffPort {
    /// Wrap raw channels, for callers that drive the protocol themselves.
    ///
    /// The caller must send exactly one [`Completion`] per [`ClaimedFile`]
    /// received, in order, before the next file is produced.
    pub fn from_channels(
        files: mpsc::Sender<ClaimedFile>,
        completions: mpsc::Receiver<Completion>,
    ) -> Self {
        Self { files, completions }
    }

    /// Deliver a file. Gives the file back if the consumer is gone.
    pub(crate) async fn deliver(&self, file: ClaimedFile) -> std::result::Result<(), ClaimedFile> {
        self.files.send(file).await.map_err(|e| e.0)
    }

    /// Wait for the completion of `file`.
    pub(crate) async fn await_completion(
        &mut self,
        file: &ClaimedFile,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let completion = match timeout {
            Some(limit) => tokio::time::timeout(limit, self.completions.recv())
                .await
                .map_err(|_| Error::HandoffTimeout {
                    path: file.path.clone(),
                    waited_ms: limit.as_millis() as u64,
                })?,
            None => self.completions.recv().await,
        };

        match completion {
            Some(done) if done.id == file.id => Ok(()),
            Some(done) => Err(Error::Handoff(format!(
                "completion for {} received while {} ({}) is in flight",
                done.id,
                file.id,
                file.path.display()
            ))),
            None => Err(Error::Handoff(format!(
                "consumer went away while {} was in flight",
                file.path.display()
            ))),
        }
    }
}

/// Consumer side of the rendezvous.
#[derive(Debug)]
pub struct Consumer {
    files: mpsc::Receiver<ClaimedFile>,
    completions: mpsc::Sender<Completion>,
}

impl Consumer {
    /// Wait for the next claimed file. `None` once the processor stopped.
    pub async fn next(&mut self) -> Option<ClaimedFile> {
        self.files.recv().await
    }

    /// Signal that `file` has been processed.
    pub async fn complete(&self, file: &ClaimedFile) -> Result<()> {
        self.completions
            .send(Completion { id: file.id })
            .await
            .map_err(|_| Error::Channel("processor is no longer running".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claimed(name: &str) -> ClaimedFile {
        ClaimedFile {
            id: Uuid::new_v4(),
            path: PathBuf::from(format!("/work/{}", name)),
            original: PathBuf::from(format!("/in/{}", name)),
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (mut port, mut consumer) = channel();
        let file = claimed("a.txt");

        port.deliver(file.clone()).await.unwrap();
        let received = consumer.next().await.unwrap();
        assert_eq!(received, file);

        consumer.complete(&received).await.unwrap();
        port.await_completion(&file, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_mismatched_completion_is_fatal() {
        let (mut port, consumer) = channel();
        let file = claimed("a.txt");

        consumer.complete(&claimed("b.txt")).await.unwrap();
        let err = port.await_completion(&file, None).await.unwrap_err();
        assert!(matches!(err, Error::Handoff(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_dropped_consumer() {
        let (mut port, consumer) = channel();
        drop(consumer);

        let file = claimed("a.txt");
        let returned = port.deliver(file.clone()).await.unwrap_err();
        assert_eq!(returned, file);
        assert!(matches!(
            port.await_completion(&file, None).await,
            Err(Error::Handoff(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout() {
        let (mut port, _consumer) = channel();
        let file = claimed("slow.txt");

        let err = port
            .await_completion(&file, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HandoffTimeout { waited_ms: 20, .. }));
    }
}
