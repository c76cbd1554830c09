//! Persisted run history.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use etftrack_types::RunReport;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a run.
pub type RunId = Uuid;

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// A scheduler tick.
    Schedule,
    /// An explicit init or update request.
    Manual,
}

impl Trigger {
    /// Returns the trigger as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A finished run as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run identifier.
    pub id: RunId,
    /// What started the run.
    pub trigger: Trigger,
    /// The run's report.
    pub report: RunReport,
}

impl RunRecord {
    /// Creates a record with a fresh identifier.
    #[must_use]
    pub fn new(trigger: Trigger, report: RunReport) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger,
            report,
        }
    }
}

/// Errors that can occur while reading or writing run history.
#[derive(Error, Debug)]
pub enum HistoryError {
    /// Failed to create a directory.
    #[error("Failed to create directory '{path}': {source}")]
    CreateDir {
        /// The path that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to read a file.
    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to write a file.
    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        /// The path that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to delete a file.
    #[error("Failed to delete file '{path}': {source}")]
    DeleteFile {
        /// The path that could not be deleted.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to read a directory.
    #[error("Failed to read directory '{path}': {source}")]
    ReadDir {
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse a run file.
    #[error("Failed to parse run file '{path}': {source}")]
    ParseJson {
        /// The path that could not be parsed.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// Failed to serialize a run.
    #[error("Failed to serialize run: {0}")]
    SerializeJson(#[from] serde_json::Error),

    /// Run not found.
    #[error("Run not found: {0}")]
    RunNotFound(RunId),
}

/// Result type for history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Returns the default etftrack data directory.
///
/// Uses the `directories` crate to find the platform location:
/// - Linux: `~/.local/share/etftrack/`
/// - macOS: `~/Library/Application Support/etftrack/`
/// - Windows: `C:\Users\<User>\AppData\Roaming\etftrack\`
///
/// Falls back to `~/.etftrack/` if none can be determined.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    ProjectDirs::from("", "", "etftrack").map_or_else(dirs_fallback, |proj_dirs| {
        proj_dirs.data_dir().to_path_buf()
    })
}

fn dirs_fallback() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".etftrack")
}

/// Stores finished runs as `{base}/runs/{id}.json`.
#[derive(Debug, Clone)]
pub struct RunHistory {
    runs_path: PathBuf,
}

impl RunHistory {
    /// Opens the history under `base_path`, creating `runs/` if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(base_path: &Path) -> Result<Self> {
        let runs_path = base_path.join("runs");
        if !runs_path.exists() {
            fs::create_dir_all(&runs_path).map_err(|e| HistoryError::CreateDir {
                path: runs_path.clone(),
                source: e,
            })?;
        }
        Ok(Self { runs_path })
    }

    /// Returns the directory holding run files.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.runs_path
    }

    /// Returns the path of a run's file.
    #[must_use]
    pub fn run_path(&self, id: RunId) -> PathBuf {
        self.runs_path.join(format!("{id}.json"))
    }

    /// Saves a run.
    ///
    /// # Errors
    ///
    /// Returns an error if the run cannot be serialized or written.
    pub fn save(&self, record: &RunRecord) -> Result<PathBuf> {
        let path = self.run_path(record.id);
        let json = serde_json::to_string_pretty(record)?;

        fs::write(&path, json).map_err(|e| HistoryError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        tracing::debug!(run = %record.id, path = %path.display(), "Saved run");
        Ok(path)
    }

    /// Loads a run.
    ///
    /// # Errors
    ///
    /// Returns an error if the run does not exist or cannot be parsed.
    pub fn load(&self, id: RunId) -> Result<RunRecord> {
        let path = self.run_path(id);
        if !path.exists() {
            return Err(HistoryError::RunNotFound(id));
        }

        let content = fs::read_to_string(&path).map_err(|e| HistoryError::ReadFile {
            path: path.clone(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| HistoryError::ParseJson { path, source: e })
    }

    /// Lists all runs, newest first. Unreadable files are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn list(&self) -> Result<Vec<RunRecord>> {
        let entries = fs::read_dir(&self.runs_path).map_err(|e| HistoryError::ReadDir {
            path: self.runs_path.clone(),
            source: e,
        })?;

        let mut runs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| HistoryError::ReadDir {
                path: self.runs_path.clone(),
                source: e,
            })?;

            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|content| {
                    serde_json::from_str::<RunRecord>(&content).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(run) => runs.push(run),
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "Skipping unreadable run file");
                }
            }
        }

        runs.sort_by(|a, b| b.report.started_at.cmp(&a.report.started_at));
        Ok(runs)
    }

    /// Returns the most recent run, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn latest(&self) -> Result<Option<RunRecord>> {
        Ok(self.list()?.into_iter().next())
    }

    /// Deletes all but the newest `keep` runs and returns how many were
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or a file cannot be
    /// deleted.
    pub fn prune(&self, keep: usize) -> Result<usize> {
        let runs = self.list()?;
        let mut removed = 0;
        for run in runs.iter().skip(keep) {
            let path = self.run_path(run.id);
            fs::remove_file(&path).map_err(|e| HistoryError::DeleteFile { path, source: e })?;
            removed += 1;
        }
        Ok(removed)
    }
}
