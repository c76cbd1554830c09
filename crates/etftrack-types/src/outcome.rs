//! Per-instrument and fleet-wide ingestion results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DateRange;

/// Which range an ingestion run requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Forced full backfill from the earliest supported date.
    Init,
    /// Incremental update from the day after the watermark.
    Update,
}

impl Mode {
    /// Returns the mode as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Update => "update",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result status of an instrument or of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Everything succeeded.
    Success,
    /// Some work succeeded and some failed.
    PartialFailure,
    /// Nothing succeeded.
    Failure,
}

impl Status {
    /// Combines instrument statuses into a run status.
    ///
    /// `Success` only if every instrument succeeded, `Failure` only if none
    /// did, `PartialFailure` otherwise. An empty set is a `Success`.
    pub fn aggregate(statuses: impl IntoIterator<Item = Self>) -> Self {
        let mut total = 0usize;
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        for status in statuses {
            total += 1;
            match status {
                Self::Success => succeeded += 1,
                Self::Failure => failed += 1,
                Self::PartialFailure => {}
            }
        }

        if succeeded == total {
            Self::Success
        } else if failed == total {
            Self::Failure
        } else {
            Self::PartialFailure
        }
    }

    /// Returns the status as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialFailure => "partial_failure",
            Self::Failure => "failure",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Category of the error that failed an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Non-retryable source failure.
    Fetch,
    /// Transient source failures on every allowed attempt.
    RetriesExhausted,
    /// Storage I/O failure.
    Storage,
    /// Per-instrument or run deadline exceeded.
    Timeout,
    /// Instrument not in the registry.
    UnknownInstrument,
}

/// Serializable description of an instrument failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl ErrorDetail {
    /// Creates a new error detail.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Result of ingesting one instrument during one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionOutcome {
    /// Instrument code.
    pub instrument: String,
    /// Mode the instrument was ingested in.
    pub mode: Mode,
    /// Range requested from the source, or `None` if nothing was requested.
    pub range: Option<DateRange>,
    /// Fetch attempts made.
    pub attempts: u32,
    /// Records returned by the source.
    pub records_fetched: usize,
    /// Records inserted or overwritten in the store.
    pub records_merged: usize,
    /// Records discarded by validation.
    pub records_rejected: usize,
    /// Instrument status.
    pub status: Status,
    /// Failure detail, if any.
    pub error: Option<ErrorDetail>,
    /// When the instrument finished.
    pub finished_at: DateTime<Utc>,
}

impl IngestionOutcome {
    /// Creates a successful outcome that did not need to request anything.
    #[must_use]
    pub fn up_to_date(instrument: impl Into<String>, mode: Mode) -> Self {
        Self {
            instrument: instrument.into(),
            mode,
            range: None,
            attempts: 0,
            records_fetched: 0,
            records_merged: 0,
            records_rejected: 0,
            status: Status::Success,
            error: None,
            finished_at: Utc::now(),
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(
        instrument: impl Into<String>,
        mode: Mode,
        range: Option<DateRange>,
        attempts: u32,
        error: ErrorDetail,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            mode,
            range,
            attempts,
            records_fetched: 0,
            records_merged: 0,
            records_rejected: 0,
            status: Status::Failure,
            error: Some(error),
            finished_at: Utc::now(),
        }
    }

    /// Returns true if the instrument fully succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, Status::Success)
    }
}

/// Aggregate of all instrument outcomes for one fleet-wide run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Mode of the run.
    pub mode: Mode,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// One outcome per configured instrument, in registry order.
    pub outcomes: Vec<IngestionOutcome>,
}

impl RunReport {
    /// Returns the aggregate run status.
    #[must_use]
    pub fn status(&self) -> Status {
        Status::aggregate(self.outcomes.iter().map(|o| o.status))
    }

    /// Returns the outcome for an instrument.
    #[must_use]
    pub fn outcome(&self, instrument: &str) -> Option<&IngestionOutcome> {
        self.outcomes.iter().find(|o| o.instrument == instrument)
    }

    /// Returns the total number of records merged across all instruments.
    #[must_use]
    pub fn records_merged(&self) -> usize {
        self.outcomes.iter().map(|o| o.records_merged).sum()
    }

    /// Returns the outcomes that did not fully succeed.
    pub fn failures(&self) -> impl Iterator<Item = &IngestionOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_aggregate() {
        use Status::{Failure, PartialFailure, Success};

        assert_eq!(Status::aggregate([]), Success);
        assert_eq!(Status::aggregate([Success, Success]), Success);
        assert_eq!(Status::aggregate([Failure, Failure]), Failure);
        assert_eq!(Status::aggregate([Success, Failure]), PartialFailure);
        assert_eq!(Status::aggregate([PartialFailure]), PartialFailure);
        assert_eq!(Status::aggregate([Failure, PartialFailure]), PartialFailure);
    }

    #[test]
    fn test_run_report_status() {
        let now = Utc::now();
        let report = RunReport {
            mode: Mode::Update,
            started_at: now,
            finished_at: now,
            outcomes: vec![
                IngestionOutcome::up_to_date("0050", Mode::Update),
                IngestionOutcome::failed(
                    "0056",
                    Mode::Update,
                    None,
                    3,
                    ErrorDetail::new(ErrorKind::RetriesExhausted, "timed out"),
                ),
            ],
        };

        assert_eq!(report.status(), Status::PartialFailure);
        assert_eq!(report.failures().count(), 1);
        assert!(report.outcome("0050").unwrap().is_success());
        assert!(report.outcome("9999").is_none());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&Status::PartialFailure).unwrap();
        assert_eq!(json, "\"partial_failure\"");
    }
}
