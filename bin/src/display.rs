//! Display utilities and output formatting for the etftrack CLI.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use etftrack_lib::{IngestionOutcome, IntegrityReport, LastUpdated, RunReport, SeriesView};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Placeholder for missing values in tables.
const NONE: &str = "-";

/// Parse a `YYYY-MM-DD` date argument.
pub(crate) fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").with_context(|| format!("Invalid date: {s}"))
}

/// Format an optional date, using `-` when absent.
pub(crate) fn format_date(date: Option<NaiveDate>) -> String {
    date.map_or_else(|| NONE.to_string(), |d| d.to_string())
}

/// Create a spinner for a long-running operation, hidden in quiet mode.
pub(crate) fn spinner(quiet: bool, message: String) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .expect("Invalid progress template"),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Print a run report as a per-instrument table.
pub(crate) fn print_run_report(report: &RunReport) {
    let elapsed = report.finished_at - report.started_at;
    println!(
        "Run: {} {} ({} -> {}, {:.1}s)",
        report.mode,
        report.status(),
        report.started_at.format("%Y-%m-%d %H:%M:%S"),
        report.finished_at.format("%Y-%m-%d %H:%M:%S"),
        elapsed.num_milliseconds() as f64 / 1000.0
    );

    if report.outcomes.is_empty() {
        println!("No instruments configured.");
        return;
    }

    println!(
        "\n{:<8} {:<16} {:<24} {:>8} {:>8} {:>8} {:>8}  ERROR",
        "CODE", "STATUS", "RANGE", "FETCHED", "MERGED", "REJECTED", "ATTEMPTS"
    );
    println!("{}", "-".repeat(100));

    for outcome in &report.outcomes {
        print_outcome(outcome);
    }

    let failed = report.failures().count();
    println!(
        "\nTotal: {} records merged, {} of {} instruments need attention",
        report.records_merged(),
        failed,
        report.outcomes.len()
    );
}

fn print_outcome(outcome: &IngestionOutcome) {
    let range = outcome
        .range
        .map_or_else(|| NONE.to_string(), |r| r.to_string());
    let error = outcome
        .error
        .as_ref()
        .map_or_else(String::new, |e| format!("{:?}: {}", e.kind, e.message));

    println!(
        "{:<8} {:<16} {:<24} {:>8} {:>8} {:>8} {:>8}  {}",
        outcome.instrument,
        outcome.status.as_str(),
        range,
        outcome.records_fetched,
        outcome.records_merged,
        outcome.records_rejected,
        outcome.attempts,
        error
    );
}

/// Print the last stored date of each instrument.
pub(crate) fn print_last_updated(rows: &[LastUpdated]) {
    println!("{:<8} {:<32} {:<12}", "CODE", "NAME", "LAST DATE");
    println!("{}", "-".repeat(54));

    for row in rows {
        println!(
            "{:<8} {:<32} {:<12}",
            row.code,
            row.name,
            format_date(row.watermark)
        );
    }

    println!("\nTotal: {} instruments", rows.len());
}

/// Print one instrument's points.
pub(crate) fn print_series(code: &str, view: &SeriesView) {
    println!(
        "{} ({} points, last stored {})",
        code,
        view.points.len(),
        format_date(view.watermark)
    );

    if view.points.is_empty() {
        println!("  No data in range.");
        return;
    }

    println!(
        "  {:<12} {:>10} {:>10} {:>10} {:>10} {:>14}",
        "DATE", "OPEN", "HIGH", "LOW", "CLOSE", "VOLUME"
    );
    for point in &view.points {
        println!(
            "  {:<12} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>14}",
            point.date.to_string(),
            point.open,
            point.high,
            point.low,
            point.close,
            point.volume
        );
    }
}

/// Print an integrity report.
pub(crate) fn print_integrity(report: &IntegrityReport) {
    println!("Instrument: {}", report.instrument);
    println!("Records: {}", report.records);
    println!(
        "Range: {} -> {}",
        format_date(report.first_date),
        format_date(report.last_date)
    );

    if report.is_clean() {
        println!("\nNo issues found.");
        return;
    }

    if !report.gaps.is_empty() {
        println!("\nGaps ({}):", report.gaps.len());
        for gap in &report.gaps {
            println!("  {} -> {} ({} days)", gap.after, gap.before, gap.days);
        }
    }

    if !report.outliers.is_empty() {
        println!("\nClose outliers ({}):", report.outliers.len());
        for date in &report.outliers {
            println!("  {date}");
        }
    }

    if !report.zero_volume.is_empty() {
        println!("\nZero-volume days ({}):", report.zero_volume.len());
        for date in &report.zero_volume {
            println!("  {date}");
        }
    }
}
