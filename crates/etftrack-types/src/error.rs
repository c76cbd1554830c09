//! Error types shared across etftrack crates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error for invalid date ranges.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateRangeError {
    /// Start date is after end date.
    #[error("Invalid date range: {start} > {end}")]
    InvalidRange {
        /// The start date.
        start: NaiveDate,
        /// The end date.
        end: NaiveDate,
    },
}

/// A record that failed business validation.
///
/// Validation errors discard a single record; they never fail a batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required field was absent in the source record.
    #[error("{date}: missing {field}")]
    MissingField {
        /// Trade date of the record.
        date: NaiveDate,
        /// Name of the missing field.
        field: &'static str,
    },

    /// A numeric field was negative or not finite.
    #[error("{date}: implausible {field} value {value}")]
    InvalidValue {
        /// Trade date of the record.
        date: NaiveDate,
        /// Name of the offending field.
        field: &'static str,
        /// The offending value.
        value: f64,
    },

    /// The record is dated after the reference date of the fetch.
    #[error("{date} is after reference date {as_of}")]
    FutureDate {
        /// Trade date of the record.
        date: NaiveDate,
        /// Reference date of the fetch.
        as_of: NaiveDate,
    },
}

/// Whether a fetch failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchErrorKind {
    /// Network failure, timeout, or rate limiting. Retryable.
    Transient,
    /// Unknown instrument or malformed request. Not retryable.
    Permanent,
}

impl FetchErrorKind {
    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure reported by a market-data source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} fetch error: {message}")]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    timed_out: bool,
}

impl FetchError {
    /// Creates a retryable fetch error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transient,
            message: message.into(),
            timed_out: false,
        }
    }

    /// Creates a non-retryable fetch error.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Permanent,
            message: message.into(),
            timed_out: false,
        }
    }

    /// Creates the transient error used when a fetch exceeds its deadline.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transient,
            message: message.into(),
            timed_out: true,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if the error is retryable.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind, FetchErrorKind::Transient)
    }

    /// Returns true if the error was produced by an elapsed timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        self.timed_out
    }
}
