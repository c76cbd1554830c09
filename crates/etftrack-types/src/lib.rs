//! Core types for the etftrack ETF history tracker.
//!
//! This crate provides the fundamental data structures used throughout etftrack:
//!
//! - [`Instrument`] - A tracked fund, identified by its exchange code
//! - [`DataPoint`] - A validated daily trading record
//! - [`RawRecord`] - A record as returned by a market-data source
//! - [`DateRange`] - Inclusive date range for data retrieval
//! - [`IngestionOutcome`] / [`RunReport`] - Results of ingestion runs

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod date_range;
mod error;
mod instrument;
mod outcome;
mod point;

pub use date_range::{DateRange, MonthIterator};
pub use error::{DateRangeError, FetchError, FetchErrorKind, ValidationError};
pub use instrument::Instrument;
pub use outcome::{ErrorDetail, ErrorKind, IngestionOutcome, Mode, RunReport, Status};
pub use point::{DataPoint, RawRecord};
