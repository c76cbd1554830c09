//! Storage error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The instrument is not part of the registry the store was opened with.
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

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

    /// A series file does not match the expected format.
    #[error("Corrupt series file '{path}' at line {line}: {reason}")]
    Corrupt {
        /// The corrupt file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        reason: String,
    },
}

impl StorageError {
    /// Returns true if the error is about an unregistered instrument.
    #[must_use]
    pub const fn is_unknown_instrument(&self) -> bool {
        matches!(self, Self::UnknownInstrument(_))
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
