//! Scheduling and run history for the etftrack ETF history tracker.
//!
//! This crate provides:
//!
//! - [`Scheduler`] - Timer-driven and on-demand fleet runs, one at a time
//! - [`SchedulerState`] - Injectable, observable scheduler state
//! - [`RunHistory`] - Persistent storage of finished run reports
//! - [`default_data_dir`] - Platform data directory for etftrack

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod history;
mod scheduler;

pub use history::{
    HistoryError, Result, RunHistory, RunId, RunRecord, Trigger, default_data_dir,
};
pub use scheduler::{ScheduleConfig, Scheduler, SchedulerError, SchedulerState};
