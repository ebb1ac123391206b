//! The loading-screen scenario: eight tasks with random outcomes, task 1
//! parenting tasks 0 and 2, live progress printed as tasks settle, and a
//! forced-success retry loop until everything is green.
//!
//! Run with `cargo run --example loading`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use grove::{FixedOutcome, FlakyOutcome, Forest, RetryController, RetryPolicy, Scheduler, TaskId};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let forest = Arc::new(Forest::new());
    for id in 0..8 {
        // Task 2 always succeeds, as in the reference data set.
        if id == 2 {
            forest.insert(id, Arc::new(FixedOutcome(true)))?;
        } else {
            forest.insert(id, Arc::new(FlakyOutcome::new(Duration::from_secs(2))))?;
        }
    }
    forest.add_children(1, &[0, 2])?;

    let scheduler = Scheduler::new(forest.clone());

    // Mirror a progress bar: print every update the watch channel delivers.
    let mut progress = scheduler.subscribe();
    tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let p = *progress.borrow_and_update();
            if p.total > 0 {
                info!("performing tasks... {}/{}", p.settled, p.total);
            }
        }
    });

    let batch: Vec<TaskId> = (0..8).collect();
    let mut report = scheduler.run(&batch).await?;

    let controller = RetryController::new(RetryPolicy::ForceSuccess);
    while !report.fully_succeeded() {
        info!(failed = ?report.failed, "some tasks didn't complete successfully, retrying");
        report = controller.retry(&scheduler, &report.failed).await?;
    }

    info!("all tasks completed successfully");
    Ok(())
}
