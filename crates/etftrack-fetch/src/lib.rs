//! Market-data fetching for the etftrack ETF history tracker.
//!
//! This crate provides the source side of the ingestion pipeline:
//!
//! - [`MarketDataClient`] - The contract every market-data source implements
//! - [`TwseClient`] - Taiwan Stock Exchange client, one request per month
//! - [`parse::parse_stock_day`] - `STOCK_DAY` response parsing
//! - [`ScriptedClient`] - Scripted in-memory client for tests

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod mock;
pub mod parse;
mod source;
pub mod url;

pub use client::{ClientConfig, TwseClient};
pub use mock::{FetchCall, Reply, ScriptedClient};
pub use source::MarketDataClient;
