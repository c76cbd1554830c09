//! Init and update command implementation.

use crate::display::{print_run_report, spinner};
use anyhow::{Context, Result, bail};
use etftrack_lib::prelude::*;

/// Run one fleet-wide ingestion and print its report.
///
/// Fails when every instrument failed, so the process exits non-zero.
pub(crate) async fn run(tracker: &Tracker, mode: Mode, quiet: bool) -> Result<()> {
    let progress = spinner(
        quiet,
        format!(
            "{} {} instruments into {}",
            match mode {
                Mode::Init => "Backfilling",
                Mode::Update => "Updating",
            },
            tracker.instruments().len(),
            tracker.settings().data_dir.display()
        ),
    );

    let result = match mode {
        Mode::Init => tracker.init().await,
        Mode::Update => tracker.update().await,
    };
    let report = result.with_context(|| format!("Failed to start {mode} run"))?;

    progress.finish_with_message(format!(
        "{} run finished: {}",
        mode,
        report.status()
    ));

    if !quiet {
        println!();
    }
    print_run_report(&report);

    if report.status() == Status::Failure {
        bail!("{mode} run failed for every instrument");
    }
    Ok(())
}
