//! Timestamped per-instrument snapshots with bounded retention.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::csv::write_series;
use crate::error::{Result, StorageError};
use crate::series::TimeSeries;

/// Sortable timestamp embedded in snapshot file names.
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3f";

/// Directory of snapshots, `{dir}/{code}_{timestamp}.csv`.
#[derive(Debug, Clone)]
pub struct Snapshots {
    dir: PathBuf,
    keep: usize,
}

impl Snapshots {
    /// Creates a snapshot directory handle keeping `keep` files per
    /// instrument. `keep == 0` disables snapshots.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, keep: usize) -> Self {
        Self {
            dir: dir.into(),
            keep,
        }
    }

    /// Returns the snapshot directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns true if snapshots are written at all.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.keep > 0
    }

    /// Writes a snapshot of `series` stamped `at`, then prunes old ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn write(&self, code: &str, series: &TimeSeries, at: DateTime<Utc>) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|source| StorageError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let path = self
            .dir
            .join(format!("{code}_{}.csv", at.format(TIMESTAMP_FORMAT)));
        let write_err = |source| StorageError::WriteFile {
            path: path.clone(),
            source,
        };
        let file = File::create(&path).map_err(write_err)?;
        write_series(series, BufWriter::new(file)).map_err(write_err)?;

        tracing::debug!(instrument = code, path = %path.display(), "Wrote snapshot");
        self.prune(code)?;
        Ok(path)
    }

    /// Lists snapshot files for `code`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub fn list(&self, code: &str) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("{code}_");
        let entries = fs::read_dir(&self.dir).map_err(|source| StorageError::ReadFile {
            path: self.dir.clone(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".csv"))
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Removes all but the newest `keep` snapshots of `code`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed. Individual
    /// removal failures are logged and skipped.
    pub fn prune(&self, code: &str) -> Result<usize> {
        let paths = self.list(code)?;
        let excess = paths.len().saturating_sub(self.keep);
        let mut removed = 0;

        for path in paths.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove snapshot");
                }
            }
        }
        Ok(removed)
    }
}
