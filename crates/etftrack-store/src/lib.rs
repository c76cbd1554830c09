//! Durable time-series storage for the etftrack ETF history tracker.
//!
//! This crate provides:
//!
//! - [`TimeSeriesStore`] - Per-instrument storage with atomic merges
//! - [`TimeSeries`] - The in-memory, date-indexed series
//! - [`Snapshots`] - Timestamped snapshots with bounded retention
//! - [`IntegrityReport`] - Read-only checks for gaps, outliers and zero volume

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod csv;
mod error;
mod integrity;
mod series;
mod snapshot;
mod store;

pub use error::{Result, StorageError};
pub use integrity::{DEFAULT_MAX_GAP_DAYS, Gap, IntegrityReport};
pub use series::{Change, TimeSeries};
pub use snapshot::Snapshots;
pub use store::{MergeSummary, TimeSeriesStore};
