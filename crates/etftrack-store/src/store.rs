//! Durable per-instrument time-series store.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{Local, NaiveDate, Utc};
use etftrack_types::DataPoint;
use serde::Serialize;

use crate::csv::{read_series, write_series};
use crate::error::{Result, StorageError};
use crate::integrity::{DEFAULT_MAX_GAP_DAYS, IntegrityReport};
use crate::series::{Change, TimeSeries};
use crate::snapshot::Snapshots;

/// Counts from one merge call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    /// Records for dates not previously stored.
    pub inserted: usize,
    /// Records that replaced differing stored values.
    pub updated: usize,
    /// Records identical to what was stored.
    pub unchanged: usize,
    /// Records that failed validation and were not stored.
    pub rejected: usize,
    /// Watermark after the merge.
    pub watermark: Option<NaiveDate>,
}

impl MergeSummary {
    /// Number of records that changed the stored series.
    #[must_use]
    pub const fn merged(&self) -> usize {
        self.inserted + self.updated
    }
}

#[derive(Debug)]
struct Slot {
    path: PathBuf,
    // Serializes writers; readers never take it.
    write: Mutex<()>,
    // `None` until first loaded from disk.
    current: RwLock<Option<Arc<TimeSeries>>>,
}

/// Date-indexed storage with one independent series per instrument.
///
/// The set of instruments is fixed when the store is opened. Each instrument
/// is loaded lazily on first access and cached. Writers to one instrument
/// are serialized; writers to different instruments never contend. Readers
/// get an [`Arc`] to an immutable series that is swapped only after the new
/// file has been renamed into place, so they see either the whole old state
/// or the whole new state.
#[derive(Debug)]
pub struct TimeSeriesStore {
    root: PathBuf,
    slots: HashMap<String, Slot>,
    snapshots: Snapshots,
}

impl TimeSeriesStore {
    /// Opens a store rooted at `root` for the given instrument codes.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be created.
    pub fn open<I, S>(root: impl Into<PathBuf>, codes: I, max_snapshots: usize) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::CreateDir {
            path: root.clone(),
            source,
        })?;

        let slots = codes
            .into_iter()
            .map(|code| {
                let code = code.into();
                let slot = Slot {
                    path: root.join(format!("{code}.csv")),
                    write: Mutex::new(()),
                    current: RwLock::new(None),
                };
                (code, slot)
            })
            .collect();

        let snapshots = Snapshots::new(root.join("snapshots"), max_snapshots);
        tracing::debug!(root = %root.display(), "Opened time-series store");

        Ok(Self {
            root,
            slots,
            snapshots,
        })
    }

    /// Returns the data directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file backing `code`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownInstrument`] for unregistered codes.
    pub fn path_for(&self, code: &str) -> Result<&Path> {
        Ok(&self.slot(code)?.path)
    }

    /// Returns true if `code` is registered with this store.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.slots.contains_key(code)
    }

    /// Returns the snapshot directory handle.
    #[must_use]
    pub const fn snapshots(&self) -> &Snapshots {
        &self.snapshots
    }

    /// Returns the current series for `code`, loading it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown instruments or unreadable files.
    pub fn series(&self, code: &str) -> Result<Arc<TimeSeries>> {
        let slot = self.slot(code)?;
        load(slot)
    }

    /// Returns the latest stored date for `code`, or `None` if empty.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown instruments or unreadable files.
    pub fn watermark(&self, code: &str) -> Result<Option<NaiveDate>> {
        Ok(self.series(code)?.watermark())
    }

    /// Returns stored points in `[from, to]`, ascending by date.
    ///
    /// An inverted range yields an empty result.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown instruments or unreadable files.
    pub fn range(&self, code: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<DataPoint>> {
        Ok(self.series(code)?.range(from, to))
    }

    /// Merges records for `code`, validating against today's local date.
    ///
    /// # Errors
    ///
    /// See [`TimeSeriesStore::merge_as_of`].
    pub fn merge(&self, code: &str, records: &[DataPoint]) -> Result<MergeSummary> {
        self.merge_as_of(code, records, Local::now().date_naive())
    }

    /// Merges records for `code`, rejecting those that fail validation
    /// relative to `as_of`.
    ///
    /// Identical records are no-ops, differing records overwrite, new dates
    /// are inserted. When nothing changes the file is not rewritten. If
    /// persisting fails the stored state, on disk and in memory, is exactly
    /// what it was before the call.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown instruments, unreadable existing data, or
    /// a failed write.
    pub fn merge_as_of(
        &self,
        code: &str,
        records: &[DataPoint],
        as_of: NaiveDate,
    ) -> Result<MergeSummary> {
        let slot = self.slot(code)?;
        let _writer = slot.write.lock().unwrap_or_else(PoisonError::into_inner);

        let current = load(slot)?;
        let mut next = (*current).clone();
        let mut summary = MergeSummary::default();

        for point in records {
            if let Err(e) = point.validate(as_of) {
                tracing::warn!(instrument = code, error = %e, "Rejected record");
                summary.rejected += 1;
                continue;
            }
            match next.apply(*point) {
                Change::Inserted => summary.inserted += 1,
                Change::Unchanged => summary.unchanged += 1,
                Change::Updated { previous } => {
                    tracing::warn!(
                        instrument = code,
                        date = %point.date,
                        old_close = previous.close,
                        new_close = point.close,
                        "Overwrote stored record"
                    );
                    summary.updated += 1;
                }
            }
        }
        summary.watermark = next.watermark();

        if summary.merged() == 0 {
            tracing::debug!(instrument = code, unchanged = summary.unchanged, "Nothing to persist");
            return Ok(summary);
        }

        persist(&slot.path, &next)?;
        let next = Arc::new(next);
        *slot.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&next));

        if self.snapshots.enabled()
            && let Err(e) = self.snapshots.write(code, &next, Utc::now())
        {
            tracing::warn!(instrument = code, error = %e, "Failed to write snapshot");
        }

        tracing::info!(
            instrument = code,
            inserted = summary.inserted,
            updated = summary.updated,
            rejected = summary.rejected,
            watermark = ?summary.watermark,
            "Merged records"
        );
        Ok(summary)
    }

    /// Runs the read-only integrity checks on `code`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown instruments or unreadable files.
    pub fn integrity(&self, code: &str) -> Result<IntegrityReport> {
        let series = self.series(code)?;
        Ok(IntegrityReport::check(code, &series, DEFAULT_MAX_GAP_DAYS))
    }

    fn slot(&self, code: &str) -> Result<&Slot> {
        self.slots
            .get(code)
            .ok_or_else(|| StorageError::UnknownInstrument(code.to_string()))
    }
}

/// Returns the cached series, reading the file on first access.
fn load(slot: &Slot) -> Result<Arc<TimeSeries>> {
    if let Some(series) = slot
        .current
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        return Ok(Arc::clone(series));
    }

    let mut current = slot.current.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(series) = current.as_ref() {
        return Ok(Arc::clone(series));
    }

    let series = match File::open(&slot.path) {
        Ok(file) => read_series(BufReader::new(file), &slot.path)?,
        Err(e) if e.kind() == ErrorKind::NotFound => TimeSeries::new(),
        Err(source) => {
            return Err(StorageError::ReadFile {
                path: slot.path.clone(),
                source,
            });
        }
    };
    tracing::debug!(path = %slot.path.display(), records = series.len(), "Loaded series");

    let series = Arc::new(series);
    *current = Some(Arc::clone(&series));
    Ok(series)
}

/// Writes `series` to a temporary file and renames it over `path`.
fn persist(path: &Path, series: &TimeSeries) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    let write_err = |source| StorageError::WriteFile {
        path: tmp.clone(),
        source,
    };

    let result = File::create(&tmp).map_err(write_err).and_then(|file| {
        let mut writer = BufWriter::new(file);
        write_series(series, &mut writer).map_err(write_err)?;
        let file = writer.into_inner().map_err(|e| write_err(e.into_error()))?;
        file.sync_all().map_err(write_err)
    });
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    fs::rename(&tmp, path).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        StorageError::WriteFile {
            path: path.to_path_buf(),
            source,
        }
    })
}
