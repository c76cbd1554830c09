//! The market-data source contract.

use async_trait::async_trait;
use etftrack_types::{DateRange, FetchError, Instrument, RawRecord};

/// A source of raw daily trading records.
///
/// Implementations return records in ascending date order and perform no
/// merging or business validation; they only confirm that the source's
/// response was structurally parseable.
#[async_trait]
pub trait MarketDataClient: Send + Sync + std::fmt::Debug {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetches raw records for `instrument` within `range` (inclusive).
    ///
    /// # Errors
    ///
    /// Returns a transient error for failures worth retrying (network,
    /// timeouts, rate limiting) and a permanent error otherwise.
    async fn fetch(
        &self,
        instrument: &Instrument,
        range: DateRange,
    ) -> Result<Vec<RawRecord>, FetchError>;
}
