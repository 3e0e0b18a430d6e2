use anyhow::{Context, Result};
use colored::Colorize;
use grinder_watch::{find_orphans, requeue_orphans};

use crate::config::GrinderConfig;

/// List, and optionally requeue, files left in the working location
pub async fn execute(config: GrinderConfig, requeue: bool) -> Result<()> {
    let target = config.watch_target()?;
    let orphans = find_orphans(&target).context("Failed to list the working location")?;

    if orphans.is_empty() {
        println!("{}", "No unfinished files.".dimmed());
        return Ok(());
    }

    for orphan in &orphans {
        println!(
            "  {} -> {}",
            orphan.working.display().to_string().yellow(),
            orphan.original.display()
        );
    }

    if requeue {
        let requeued = requeue_orphans(&orphans).context("Failed to requeue files")?;
        println!(
            "{} Requeued {} of {} file(s)",
            "Success:".green().bold(),
            requeued,
            orphans.len()
        );
    } else {
        println!(
            "\n{} unfinished file(s). Use {} to process them again.",
            orphans.len(),
            "--requeue".yellow()
        );
    }

    Ok(())
}
