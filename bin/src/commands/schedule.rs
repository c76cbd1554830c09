//! Schedule command implementation.
//!
//! Runs periodic updates in the foreground until Ctrl-C.

use anyhow::{Context, Result};
use etftrack_lib::prelude::*;

/// Start the scheduler and block until interrupted.
pub(crate) async fn schedule(tracker: &Tracker) -> Result<()> {
    let config = tracker.scheduler().config();
    match config.daily_at {
        Some(at) => println!("Updating daily at {at} (local time). Press Ctrl-C to stop."),
        None => println!(
            "Updating every {}s. Press Ctrl-C to stop.",
            config.interval.as_secs()
        ),
    }

    tracker.start_schedule();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    println!("Stopping scheduler...");
    tracker.shutdown().await;

    let state = tracker.scheduler().state();
    println!(
        "Completed {} scheduled runs ({} ticks skipped while busy)",
        state.runs_completed, state.ticks_skipped
    );
    if let Some(report) = state.last_report {
        println!(
            "Last run: {} {}, {} records merged",
            report.mode,
            report.status(),
            report.records_merged()
        );
    }

    Ok(())
}
