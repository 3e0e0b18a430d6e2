use anyhow::{bail, Context, Result};
use grinder_watch::{handoff, Claimer, Consumer, Processor, RenameClaimer};
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::config::GrinderConfig;

/// Run a processor until Ctrl-C or a fatal error
pub async fn execute(config: GrinderConfig) -> Result<()> {
    let target = config.watch_target()?;
    let processor = Processor::new(target, config.processor_options())
        .context("Failed to start processor")?;
    let stats = processor.stats();
    let claimer = RenameClaimer::new(processor.target().working().clone());

    let (port, consumer) = handoff::channel();
    let consumer_task = tokio::spawn(consume(consumer, config.consumer.command.clone(), claimer));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let result = processor.run_until(port, shutdown).await;

    // The port is gone once the processor returns, so the consumer stops too.
    let consumed = consumer_task.await.context("Consumer task failed")?;
    let snapshot = stats.snapshot();
    info!(
        "Processed {} file(s) in {} scan(s); {} claim(s) lost to other processors",
        snapshot.finalized, snapshot.scans, snapshot.lost
    );

    match (result, consumed) {
        (Ok(()), consumed) => consumed,
        (Err(e), Err(consumer_error)) => {
            error!("Consumer stopped: {:#}", consumer_error);
            Err(consumer_error.context(format!("Processing stopped: {}", e)))
        }
        (Err(e), Ok(())) => Err(e).context("Processing stopped"),
    }
}

/// Hand each claimed file to `command`, or just log it when there is none.
///
/// A command that fails or is killed has not processed the file, so the file
/// is moved back to where it was found and the consumer stops. Completing it
/// would finalize, and in discard mode delete, unprocessed input.
async fn consume(mut consumer: Consumer, command: Vec<String>, claimer: RenameClaimer) -> Result<()> {
    while let Some(file) = consumer.next().await {
        match command.split_first() {
            Some((program, args)) => {
                let status = Command::new(program)
                    .args(args)
                    .arg(&file.path)
                    .status()
                    .await;
                let status = match status {
                    Ok(status) => status,
                    Err(e) => {
                        claimer.release(&file.path, &file.original).await?;
                        return Err(e).with_context(|| format!("Failed to run '{}'", program));
                    }
                };
                if !status.success() {
                    claimer.release(&file.path, &file.original).await?;
                    bail!(
                        "'{}' failed ({}) on {}; the file was returned to {}",
                        program,
                        status,
                        file.path.display(),
                        file.original.display()
                    );
                }
                info!("{} done: {}", program, file.original.display());
            }
            None => info!("Received {}", file.path.display()),
        }
        consumer.complete(&file).await?;
    }
    Ok(())
}
