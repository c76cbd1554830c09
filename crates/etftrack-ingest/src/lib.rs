//! Ingestion and queries for the etftrack ETF history tracker.
//!
//! This crate provides:
//!
//! - [`IngestionEngine`] - Brings one instrument up to date
//! - [`RetryPolicy`] - Bounded exponential backoff for transient failures
//! - [`FleetOrchestrator`] - Runs the engine over all instruments
//! - [`QueryService`] - Range and period queries over stored series

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod engine;
mod orchestrator;
mod query;
mod retry;

pub use engine::{DEFAULT_EARLIEST_DATE, DEFAULT_WINDOW_MONTHS, EngineConfig, IngestionEngine};
pub use orchestrator::{FleetOrchestrator, OrchestratorConfig};
pub use query::{LastUpdated, ParsePeriodError, Period, QueryService, SeriesView};
pub use retry::RetryPolicy;
