//! Historical ETF market data, kept current.
//!
//! This is a facade crate that re-exports the etftrack workspace crates and
//! adds the pieces that tie them together:
//!
//! - [`Settings`] - Operational settings loaded from TOML
//! - [`Tracker`] - One data directory with its registry, store, scheduler and
//!   queries
//!
//! # Quick Start
//!
//! ```ignore
//! use etftrack_lib::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tracker = Tracker::new(Settings::default())?;
//!     let report = tracker.init().await?;
//!     println!("{}: {} records", report.status(), report.records_merged());
//!     Ok(())
//! }
//! ```

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod settings;
mod tracker;

pub use settings::{ConfigError, RetrySettings, ScheduleSettings, Settings, SourceSettings};
pub use tracker::{Tracker, TrackerError};

// Re-export core types
pub use etftrack_types::*;

// Re-export the component crates
pub use etftrack_daemon::{
    HistoryError, RunHistory, RunId, RunRecord, ScheduleConfig, Scheduler, SchedulerError,
    SchedulerState, Trigger, default_data_dir,
};
pub use etftrack_fetch::{ClientConfig, MarketDataClient, TwseClient};
pub use etftrack_ingest::{
    EngineConfig, FleetOrchestrator, IngestionEngine, LastUpdated, OrchestratorConfig,
    ParsePeriodError, Period, QueryService, RetryPolicy, SeriesView,
};
pub use etftrack_instruments::{InstrumentRegistry, RegistryError};
pub use etftrack_store::{Gap, IntegrityReport, MergeSummary, StorageError, TimeSeriesStore};

/// Prelude module for convenient imports.
///
/// ```
/// use etftrack_lib::prelude::*;
/// ```
pub mod prelude {
    pub use etftrack_types::{
        DataPoint, DateRange, FetchError, Instrument, IngestionOutcome, Mode, RunReport, Status,
    };

    pub use etftrack_ingest::{LastUpdated, Period, SeriesView};
    pub use etftrack_instruments::InstrumentRegistry;

    pub use crate::{Settings, Tracker, TrackerError};
}
