//! Tests for exclusive claiming between competing processors.

use grinder_watch::{
    spawn, ClaimOutcome, Claimer, LossReason, Processor, ProcessorOptions, RenameClaimer,
    WorkingLocation,
};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_concurrent_claims_have_one_winner() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::create_dir(root.join("processing")).unwrap();

    for round in 0..20 {
        let path = root.join(format!("file-{}.dat", round));
        fs::write(&path, "x").unwrap();

        let first = RenameClaimer::new(WorkingLocation::Directory(root.join("processing")));
        let second = first.clone();
        let (a, b) = tokio::join!(first.try_claim(&path), second.try_claim(&path));
        let outcomes = [a.unwrap(), b.unwrap()];

        let winners = outcomes.iter().filter(|o| o.is_claimed()).count();
        assert_eq!(winners, 1, "round {}: {:?}", round, outcomes);
        assert!(outcomes.iter().any(|o| matches!(
            o,
            ClaimOutcome::Lost(LossReason::SourceGone | LossReason::DestinationOccupied)
        )));
    }
}

/// Files with the same base name from different subdirectories compete for
/// one working name. The loser keeps its file and the winner's is never
/// overwritten.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_same_name_claims_never_overwrite() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let processing = root.join("processing");
    for dir in ["x", "y", "processing"] {
        fs::create_dir(root.join(dir)).unwrap();
    }

    for round in 0..200 {
        let name = format!("f{}.dat", round);
        let sources = [root.join("x").join(&name), root.join("y").join(&name)];
        for source in &sources {
            fs::write(source, source.to_string_lossy().as_bytes()).unwrap();
        }

        let claimer = RenameClaimer::new(WorkingLocation::Directory(processing.clone()));
        let tasks: Vec<_> = sources
            .iter()
            .cloned()
            .map(|source| {
                let claimer = claimer.clone();
                tokio::spawn(async move { claimer.try_claim(&source).await })
            })
            .collect();
        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap().unwrap());
        }

        let winner = match outcomes.as_slice() {
            [ClaimOutcome::Claimed(_), ClaimOutcome::Lost(LossReason::DestinationOccupied)] => 0,
            [ClaimOutcome::Lost(LossReason::DestinationOccupied), ClaimOutcome::Claimed(_)] => 1,
            other => panic!("round {}: expected one winner, got {:?}", round, other),
        };
        let loser = 1 - winner;

        assert_eq!(
            fs::read_to_string(processing.join(&name)).unwrap(),
            sources[winner].to_string_lossy()
        );
        assert!(!sources[winner].exists());
        assert!(sources[loser].exists(), "round {}: losing file vanished", round);
    }
}

/// Two processors on the same root hand off every file exactly once.
#[tokio::test]
async fn test_competing_processors_share_work() {
    const FILES: usize = 30;

    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().to_path_buf();
    for i in 0..FILES {
        fs::write(root.join(format!("job-{:02}.dat", i)), format!("{}", i)).unwrap();
    }

    let options = ProcessorOptions::new().with_scan_interval(Duration::from_millis(10));
    let seen: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();

    for _ in 0..2 {
        let processor = Processor::for_directory(&root, r"^job-\d+\.dat$", options.clone()).unwrap();
        let (handle, mut consumer) = spawn(processor);
        handles.push(handle);

        let seen = seen.clone();
        handles.push(tokio::spawn(async move {
            while let Some(file) = consumer.next().await {
                seen.lock().unwrap().push(file.original.clone());
                tokio::task::yield_now().await;
                consumer.complete(&file).await?;
            }
            Ok::<_, grinder_watch::Error>(())
        }));
    }

    let processed = root.join("processed");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while fs::read_dir(&processed).unwrap().count() < FILES {
        assert!(tokio::time::Instant::now() < deadline, "files were not all processed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    for handle in &handles {
        handle.abort();
    }

    let seen = seen.lock().unwrap();
    let unique: HashSet<_> = seen.iter().collect();
    assert_eq!(seen.len(), FILES);
    assert_eq!(unique.len(), FILES);
    assert_eq!(fs::read_dir(root.join("processing")).unwrap().count(), 0);
}
