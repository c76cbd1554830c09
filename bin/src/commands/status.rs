//! Status command implementation.

use crate::display::print_last_updated;
use anyhow::{Context, Result};
use etftrack_lib::prelude::*;

/// Show every instrument's last stored date and the latest persisted run.
pub(crate) fn status(tracker: &Tracker) -> Result<()> {
    println!("Data: {}\n", tracker.settings().data_dir.display());
    print_last_updated(&tracker.list_last_updated());

    let latest = tracker.latest_run().context("Failed to read run history")?;

    let Some(record) = latest else {
        println!("\nNo runs recorded yet.");
        return Ok(());
    };

    let report = &record.report;
    println!("\nLatest run: {} ({})", record.id, record.trigger);
    println!("Mode: {}", report.mode);
    println!("Status: {}", report.status());
    println!(
        "Finished: {}",
        report.finished_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("Records merged: {}", report.records_merged());

    for outcome in report.failures() {
        let reason = outcome
            .error
            .as_ref()
            .map_or_else(
                || format!("{} records rejected", outcome.records_rejected),
                ToString::to_string,
            );
        println!("  {} [{}] {}", outcome.instrument, outcome.status, reason);
    }

    Ok(())
}
