//! List command implementation.
//!
//! This module handles listing registered instruments with optional filtering.

use crate::display::format_date;
use anyhow::{Context, Result};
use etftrack_lib::prelude::*;

/// List registered instruments, optionally filtered by a search pattern.
pub(crate) fn list_instruments(settings: &Settings, search: Option<&str>) -> Result<()> {
    let registry = match &settings.registry {
        Some(path) => InstrumentRegistry::from_file(path)
            .with_context(|| format!("Failed to load registry from {}", path.display()))?,
        None => InstrumentRegistry::builtin(),
    };

    let instruments: Vec<_> = match search {
        Some(pattern) => registry.search(pattern),
        None => registry.all().collect(),
    };

    if instruments.is_empty() {
        println!("No instruments found.");
        return Ok(());
    }

    println!("{:<8} {:<32} {:<12}", "CODE", "NAME", "START");
    println!("{}", "-".repeat(54));

    for instrument in &instruments {
        println!(
            "{:<8} {:<32} {:<12}",
            instrument.code(),
            instrument.name(),
            format_date(instrument.start_date())
        );
    }

    println!("\nTotal: {} instruments", instruments.len());
    Ok(())
}
