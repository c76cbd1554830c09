//! Integrity report command implementation.

use crate::display::print_integrity;
use anyhow::{Context, Result};
use etftrack_lib::prelude::*;

/// Check one instrument's stored series.
pub(crate) fn report(tracker: &Tracker, code: &str) -> Result<()> {
    let report = tracker
        .integrity(code)
        .with_context(|| format!("Failed to check {code}"))?;
    print_integrity(&report);
    Ok(())
}
