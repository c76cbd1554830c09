//! Per-instrument ingestion.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, Utc};
use etftrack_fetch::MarketDataClient;
use etftrack_store::{StorageError, TimeSeriesStore};
use etftrack_types::{
    DataPoint, DateRange, ErrorDetail, ErrorKind, FetchError, IngestionOutcome, Instrument, Mode,
    RawRecord, Status,
};

use crate::RetryPolicy;

/// First trading day the TWSE daily endpoint reliably serves.
pub const DEFAULT_EARLIEST_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2010, 1, 4) {
    Some(date) => date,
    None => panic!("invalid default earliest date"),
};

/// Months fetched per attempt unless configured otherwise.
pub const DEFAULT_WINDOW_MONTHS: u32 = 12;

/// Engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Lower bound of every backfill.
    pub earliest: NaiveDate,
    /// Limit for one fetch attempt and for one storage operation.
    pub timeout: Duration,
    /// Calendar months requested per fetch attempt. Longer ranges are
    /// fetched and merged window by window, oldest first.
    pub window_months: u32,
    /// Retry policy for transient fetch failures.
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            earliest: DEFAULT_EARLIEST_DATE,
            timeout: Duration::from_secs(120),
            window_months: DEFAULT_WINDOW_MONTHS,
            retry: RetryPolicy::default(),
        }
    }
}

/// Brings one instrument up to date.
///
/// The engine never returns an error: every failure is captured in the
/// [`IngestionOutcome`] of the instrument it happened to.
#[derive(Debug, Clone)]
pub struct IngestionEngine {
    client: Arc<dyn MarketDataClient>,
    store: Arc<TimeSeriesStore>,
    config: EngineConfig,
}

/// Running totals for one instrument across its fetch windows.
#[derive(Debug, Default)]
struct Progress {
    attempts: u32,
    fetched: usize,
    merged: usize,
    rejected: usize,
    watermark: Option<NaiveDate>,
}

enum FetchFailure {
    Permanent(FetchError),
    Exhausted(FetchError),
}

impl IngestionEngine {
    /// Creates a new engine.
    #[must_use]
    pub fn new(
        client: Arc<dyn MarketDataClient>,
        store: Arc<TimeSeriesStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the store the engine merges into.
    #[must_use]
    pub const fn store(&self) -> &Arc<TimeSeriesStore> {
        &self.store
    }

    /// Ingests `instrument` up to today's local date.
    pub async fn run(&self, instrument: &Instrument, mode: Mode) -> IngestionOutcome {
        self.run_as_of(instrument, mode, Local::now().date_naive())
            .await
    }

    /// Ingests `instrument` up to `today`.
    pub async fn run_as_of(
        &self,
        instrument: &Instrument,
        mode: Mode,
        today: NaiveDate,
    ) -> IngestionOutcome {
        let code = instrument.code();

        let watermark = match mode {
            Mode::Init => None,
            Mode::Update => {
                let store = Arc::clone(&self.store);
                let owned = code.to_string();
                match self.blocking(move || store.watermark(&owned)).await {
                    Ok(watermark) => watermark,
                    Err(detail) => {
                        tracing::error!(instrument = code, error = %detail, "Failed to read watermark");
                        return IngestionOutcome::failed(code, mode, None, 0, detail);
                    }
                }
            }
        };

        let Some(range) = self.plan(instrument, watermark, today) else {
            tracing::info!(instrument = code, watermark = ?watermark, "Already up to date");
            return IngestionOutcome::up_to_date(code, mode);
        };
        tracing::info!(instrument = code, mode = %mode, range = %range, "Ingesting");

        let mut progress = Progress::default();
        for window in range.windows(self.config.window_months) {
            if let Err(detail) = self.ingest_window(instrument, window, today, &mut progress).await {
                tracing::error!(
                    instrument = code,
                    window = %window,
                    attempts = progress.attempts,
                    merged = progress.merged,
                    error = %detail,
                    "Ingestion failed"
                );
                let mut outcome =
                    IngestionOutcome::failed(code, mode, Some(range), progress.attempts, detail);
                outcome.records_fetched = progress.fetched;
                outcome.records_merged = progress.merged;
                outcome.records_rejected = progress.rejected;
                return outcome;
            }
        }

        let status = if progress.rejected > 0 {
            Status::PartialFailure
        } else {
            Status::Success
        };
        tracing::info!(
            instrument = code,
            fetched = progress.fetched,
            merged = progress.merged,
            rejected = progress.rejected,
            watermark = ?progress.watermark,
            "Instrument done"
        );

        IngestionOutcome {
            instrument: code.to_string(),
            mode,
            range: Some(range),
            attempts: progress.attempts,
            records_fetched: progress.fetched,
            records_merged: progress.merged,
            records_rejected: progress.rejected,
            status,
            error: None,
            finished_at: Utc::now(),
        }
    }

    /// Fetches one window, then converts and merges it.
    ///
    /// Windows merged before a failure stay stored, so an interrupted
    /// backfill resumes from the new watermark on the next update.
    async fn ingest_window(
        &self,
        instrument: &Instrument,
        window: DateRange,
        today: NaiveDate,
        progress: &mut Progress,
    ) -> Result<(), ErrorDetail> {
        let code = instrument.code();
        let (attempts, result) = self.fetch_with_retry(instrument, window).await;
        progress.attempts += attempts;

        let fetched = result.map_err(|failure| match failure {
            FetchFailure::Permanent(e) => ErrorDetail::new(ErrorKind::Fetch, e.to_string()),
            FetchFailure::Exhausted(e) => {
                let kind = if e.is_timeout() {
                    ErrorKind::Timeout
                } else {
                    ErrorKind::RetriesExhausted
                };
                ErrorDetail::new(kind, format!("gave up after {attempts} attempts: {e}"))
            }
        })?;

        progress.fetched += fetched.len();
        let (points, invalid) = convert(code, fetched);
        progress.rejected += invalid;
        if points.is_empty() {
            return Ok(());
        }

        let store = Arc::clone(&self.store);
        let owned = code.to_string();
        let summary = self
            .blocking(move || store.merge_as_of(&owned, &points, today))
            .await?;
        progress.merged += summary.merged();
        progress.rejected += summary.rejected;
        progress.watermark = summary.watermark;
        tracing::debug!(
            instrument = code,
            window = %window,
            merged = summary.merged(),
            "Window merged"
        );
        Ok(())
    }

    /// Computes the range to request, or `None` if there is nothing to do.
    ///
    /// Without a watermark the full backfill range is used; with one, the
    /// range starts the day after it.
    #[must_use]
    pub fn plan(
        &self,
        instrument: &Instrument,
        watermark: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Option<DateRange> {
        match watermark {
            Some(watermark) => DateRange::after(watermark, today),
            None => DateRange::new(instrument.backfill_start(self.config.earliest), today).ok(),
        }
    }

    async fn fetch_with_retry(
        &self,
        instrument: &Instrument,
        range: DateRange,
    ) -> (u32, Result<Vec<RawRecord>, FetchFailure>) {
        let code = instrument.code();
        let retry = self.config.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result =
                match tokio::time::timeout(self.config.timeout, self.client.fetch(instrument, range))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::timeout(format!(
                        "no response within {}s",
                        self.config.timeout.as_secs_f64()
                    ))),
                };

            match result {
                Ok(records) => return (attempt, Ok(records)),
                Err(e) if !e.is_transient() => return (attempt, Err(FetchFailure::Permanent(e))),
                Err(e) if !retry.allows_retry_after(attempt) => {
                    return (attempt, Err(FetchFailure::Exhausted(e)));
                }
                Err(e) => {
                    let delay = retry.delay_for(attempt, code);
                    tracing::warn!(
                        instrument = code,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Runs a storage call on the blocking pool under the engine timeout.
    async fn blocking<T, F>(&self, f: F) -> Result<T, ErrorDetail>
    where
        F: FnOnce() -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(f);
        match tokio::time::timeout(self.config.timeout, handle).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(storage_detail(&e)),
            Ok(Err(join)) => Err(ErrorDetail::new(
                ErrorKind::Storage,
                format!("storage task failed: {join}"),
            )),
            Err(_) => Err(ErrorDetail::new(
                ErrorKind::Timeout,
                format!(
                    "storage did not finish within {}s",
                    self.config.timeout.as_secs_f64()
                ),
            )),
        }
    }
}

fn storage_detail(error: &StorageError) -> ErrorDetail {
    let kind = if error.is_unknown_instrument() {
        ErrorKind::UnknownInstrument
    } else {
        ErrorKind::Storage
    };
    ErrorDetail::new(kind, error.to_string())
}

/// Deduplicates by date (last occurrence wins) and converts to data points.
///
/// Returns the points and the number of records that could not be converted.
fn convert(code: &str, records: Vec<RawRecord>) -> (Vec<DataPoint>, usize) {
    let by_date: BTreeMap<NaiveDate, RawRecord> =
        records.into_iter().map(|r| (r.date, r)).collect();

    let mut invalid = 0;
    let points = by_date
        .into_values()
        .filter_map(|raw| match DataPoint::try_from(raw) {
            Ok(point) => Some(point),
            Err(e) => {
                tracing::warn!(instrument = code, error = %e, "Rejected record");
                invalid += 1;
                None
            }
        })
        .collect();
    (points, invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use etftrack_fetch::{Reply, ScriptedClient};
    use tempfile::TempDir;

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap()
    }

    fn raw(month: u32, day: u32, close: f64) -> RawRecord {
        RawRecord::complete(date(month, day), close, close, close, close, 1_000.0)
    }

    fn config() -> EngineConfig {
        EngineConfig {
            earliest: date(1, 1),
            timeout: Duration::from_secs(5),
            window_months: DEFAULT_WINDOW_MONTHS,
            retry: RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1)),
        }
    }

    struct Fixture {
        _temp: TempDir,
        client: Arc<ScriptedClient>,
        store: Arc<TimeSeriesStore>,
        engine: IngestionEngine,
    }

    fn fixture(client: ScriptedClient) -> Fixture {
        fixture_with(client, config())
    }

    fn fixture_with(client: ScriptedClient, config: EngineConfig) -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(TimeSeriesStore::open(temp.path(), ["0050", "0056"], 0).unwrap());
        let client = Arc::new(client);
        let engine = IngestionEngine::new(client.clone(), Arc::clone(&store), config);
        Fixture {
            _temp: temp,
            client,
            store,
            engine,
        }
    }

    fn etf(code: &str) -> Instrument {
        Instrument::new(code, code)
    }

    #[tokio::test]
    async fn test_init_stores_deduplicated_fetch() {
        let client = ScriptedClient::new().with_reply(
            "0050",
            Reply::Records(vec![raw(1, 2, 100.0), raw(1, 3, 101.0), raw(1, 2, 100.5)]),
        );
        let f = fixture(client);

        let outcome = f.engine.run_as_of(&etf("0050"), Mode::Init, date(1, 10)).await;

        assert_eq!(outcome.status, Status::Success);
        assert_eq!(outcome.records_fetched, 3);
        assert_eq!(outcome.records_merged, 2);
        assert_eq!(outcome.range, Some(DateRange::new(date(1, 1), date(1, 10)).unwrap()));

        let stored = f.store.range("0050", date(1, 1), date(1, 10)).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].close, 100.5);
        assert_eq!(f.store.watermark("0050").unwrap(), Some(date(1, 3)));
    }

    #[tokio::test]
    async fn test_update_requests_after_watermark() {
        let client = ScriptedClient::new();
        let f = fixture(client);
        f.store
            .merge_as_of("0050", &[DataPoint::new(date(1, 5), 1.0, 1.0, 1.0, 1.0, 1)], date(1, 5))
            .unwrap();

        let outcome = f.engine.run_as_of(&etf("0050"), Mode::Update, date(1, 10)).await;

        assert_eq!(outcome.status, Status::Success);
        assert_eq!(outcome.records_merged, 0);
        let calls = f.client.calls_for("0050");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].range, DateRange::new(date(1, 6), date(1, 10)).unwrap());
    }

    #[tokio::test]
    async fn test_update_when_current_does_not_fetch() {
        let f = fixture(ScriptedClient::new());
        f.store
            .merge_as_of("0050", &[DataPoint::new(date(1, 10), 1.0, 1.0, 1.0, 1.0, 1)], date(1, 10))
            .unwrap();

        let outcome = f.engine.run_as_of(&etf("0050"), Mode::Update, date(1, 10)).await;

        assert_eq!(outcome.status, Status::Success);
        assert_eq!(outcome.records_merged, 0);
        assert_eq!(outcome.range, None);
        assert!(f.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_without_watermark_backfills() {
        let f = fixture(ScriptedClient::new());
        let instrument = etf("0056").with_start_date(date(1, 3));

        f.engine.run_as_of(&instrument, Mode::Update, date(1, 10)).await;

        let calls = f.client.calls_for("0056");
        assert_eq!(calls[0].range, DateRange::new(date(1, 3), date(1, 10)).unwrap());
    }

    #[tokio::test]
    async fn test_incremental_update_merges_only_new_dates() {
        let history: Vec<_> = [2, 3, 4, 5, 8]
            .into_iter()
            .map(|d| raw(1, d, 100.0 + f64::from(d)))
            .collect();
        let client = ScriptedClient::new().with_history("0050", history);
        let f = fixture(client);
        let existing: Vec<_> = [2, 3, 4, 5]
            .into_iter()
            .map(|d| DataPoint::try_from(raw(1, d, 100.0 + f64::from(d))).unwrap())
            .collect();
        f.store.merge_as_of("0050", &existing, date(1, 5)).unwrap();

        let outcome = f.engine.run_as_of(&etf("0050"), Mode::Update, date(1, 10)).await;

        assert_eq!(outcome.status, Status::Success);
        assert_eq!(outcome.records_merged, 1);
        let dates: Vec<_> = f
            .store
            .range("0050", date(1, 1), date(1, 10))
            .unwrap()
            .iter()
            .map(|p| p.date)
            .collect();
        assert_eq!(dates, vec![date(1, 2), date(1, 3), date(1, 4), date(1, 5), date(1, 8)]);
        assert_eq!(f.store.watermark("0050").unwrap(), Some(date(1, 8)));
    }

    #[tokio::test]
    async fn test_overlapping_init_counts_only_changes() {
        let existing: Vec<_> = [2, 3, 4, 5]
            .into_iter()
            .map(|d| DataPoint::try_from(raw(1, d, 50.0)).unwrap())
            .collect();
        let client = ScriptedClient::new()
            .with_reply("0050", Reply::Records(vec![raw(1, 4, 50.0), raw(1, 8, 51.0)]));
        let f = fixture(client);
        f.store.merge_as_of("0050", &existing, date(1, 5)).unwrap();

        let outcome = f.engine.run_as_of(&etf("0050"), Mode::Init, date(1, 10)).await;

        assert_eq!(outcome.records_merged, 1);
        assert_eq!(f.store.range("0050", date(1, 1), date(1, 10)).unwrap().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let client = ScriptedClient::new()
            .with_reply("0050", Reply::Fail(FetchError::transient("reset")))
            .with_reply("0050", Reply::Fail(FetchError::transient("reset")))
            .with_reply("0050", Reply::Records(vec![raw(1, 2, 1.0)]));
        let f = fixture(client);

        let outcome = f.engine.run_as_of(&etf("0050"), Mode::Init, date(1, 10)).await;

        assert_eq!(outcome.status, Status::Success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.records_merged, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let client = ScriptedClient::new();
        for _ in 0..3 {
            client.push_reply("0050", Reply::Fail(FetchError::transient("HTTP 503")));
        }
        let f = fixture(client);

        let outcome = f.engine.run_as_of(&etf("0050"), Mode::Init, date(1, 10)).await;

        assert_eq!(outcome.status, Status::Failure);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.error.unwrap().kind, ErrorKind::RetriesExhausted);
        assert_eq!(f.client.calls_for("0050").len(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let client = ScriptedClient::new()
            .with_reply("0050", Reply::Fail(FetchError::permanent("HTTP 404")));
        let f = fixture(client);

        let outcome = f.engine.run_as_of(&etf("0050"), Mode::Init, date(1, 10)).await;

        assert_eq!(outcome.status, Status::Failure);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.error.unwrap().kind, ErrorKind::Fetch);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_are_transient_and_bounded() {
        let client = ScriptedClient::new();
        for _ in 0..3 {
            client.push_reply("0056", Reply::Hang);
        }
        let f = fixture(client);

        let outcome = f.engine.run_as_of(&etf("0056"), Mode::Init, date(1, 10)).await;

        assert_eq!(outcome.status, Status::Failure);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.error.unwrap().kind, ErrorKind::Timeout);
        assert_eq!(f.store.watermark("0056").unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_fetch_is_success() {
        let f = fixture(ScriptedClient::new());

        let outcome = f.engine.run_as_of(&etf("0050"), Mode::Init, date(1, 10)).await;

        assert_eq!(outcome.status, Status::Success);
        assert_eq!(outcome.records_fetched, 0);
        assert_eq!(outcome.records_merged, 0);
    }

    #[tokio::test]
    async fn test_invalid_records_make_partial_failure() {
        let mut missing = raw(1, 3, 1.0);
        missing.close = None;
        let client = ScriptedClient::new()
            .with_reply("0050", Reply::Records(vec![raw(1, 2, 1.0), missing]));
        let f = fixture(client);

        let outcome = f.engine.run_as_of(&etf("0050"), Mode::Init, date(1, 10)).await;

        assert_eq!(outcome.status, Status::PartialFailure);
        assert_eq!(outcome.records_merged, 1);
        assert_eq!(outcome.records_rejected, 1);
    }

    #[tokio::test]
    async fn test_unknown_instrument() {
        let f = fixture(ScriptedClient::new());

        let outcome = f.engine.run_as_of(&etf("9999"), Mode::Update, date(1, 10)).await;

        assert_eq!(outcome.status, Status::Failure);
        assert_eq!(outcome.error.unwrap().kind, ErrorKind::UnknownInstrument);
        assert!(f.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_merge_failure_is_not_retried() {
        let client = ScriptedClient::new()
            .with_reply("0050", Reply::Records(vec![raw(1, 2, 1.0)]));
        let f = fixture(client);
        std::fs::create_dir(f.store.root().join("0050.csv.tmp")).unwrap();

        let outcome = f.engine.run_as_of(&etf("0050"), Mode::Init, date(1, 10)).await;

        assert_eq!(outcome.status, Status::Failure);
        assert_eq!(outcome.error.unwrap().kind, ErrorKind::Storage);
        assert_eq!(outcome.records_fetched, 1);
        assert_eq!(f.client.calls_for("0050").len(), 1);
        assert_eq!(f.store.watermark("0050").unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multi_year_init_with_default_config() {
        // One record per year, served at two seconds per requested month:
        // the whole range in one call would take far longer than the timeout.
        let history: Vec<_> = (2010..=2026)
            .map(|year| {
                let day = NaiveDate::from_ymd_opt(year, 6, 3).unwrap();
                RawRecord::complete(day, 10.0, 10.0, 10.0, 10.0, 1_000.0)
            })
            .collect();
        let client = ScriptedClient::new()
            .with_history("0050", history)
            .with_month_delay(Duration::from_secs(2));
        let f = fixture_with(client, EngineConfig::default());
        let today = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();

        let outcome = f.engine.run_as_of(&etf("0050"), Mode::Init, today).await;

        assert_eq!(outcome.status, Status::Success);
        assert_eq!(outcome.records_merged, 17);
        assert_eq!(outcome.attempts, 17);
        assert_eq!(
            f.store.watermark("0050").unwrap(),
            NaiveDate::from_ymd_opt(2026, 6, 3)
        );

        let calls = f.client.calls_for("0050");
        assert_eq!(calls.len(), 17);
        assert_eq!(calls[0].range.start, DEFAULT_EARLIEST_DATE);
        assert_eq!(calls[16].range.end, today);
        assert!(
            calls
                .iter()
                .all(|c| c.range.months().count() <= DEFAULT_WINDOW_MONTHS as usize)
        );
    }

    #[tokio::test]
    async fn test_failed_window_keeps_earlier_windows() {
        let client = ScriptedClient::new()
            .with_reply("0050", Reply::Records(vec![raw(1, 2, 1.0), raw(2, 5, 2.0)]))
            .with_reply("0050", Reply::Fail(FetchError::permanent("HTTP 404")))
            .with_history("0050", vec![raw(1, 2, 1.0), raw(2, 5, 2.0)]);
        let f = fixture_with(
            client,
            EngineConfig {
                window_months: 1,
                ..config()
            },
        );

        let outcome = f.engine.run_as_of(&etf("0050"), Mode::Init, date(2, 10)).await;

        assert_eq!(outcome.status, Status::Failure);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.records_merged, 1);
        assert_eq!(outcome.error.unwrap().kind, ErrorKind::Fetch);
        assert_eq!(f.store.watermark("0050").unwrap(), Some(date(1, 2)));

        let outcome = f.engine.run_as_of(&etf("0050"), Mode::Update, date(2, 10)).await;

        assert_eq!(outcome.status, Status::Success);
        assert_eq!(outcome.records_merged, 1);
        assert_eq!(f.client.calls_for("0050")[2].range.start, date(1, 3));
        assert_eq!(f.store.watermark("0050").unwrap(), Some(date(2, 5)));
    }

    #[test]
    fn test_plan() {
        let f = fixture(ScriptedClient::new());
        let instrument = etf("0050");

        assert_eq!(
            f.engine.plan(&instrument, None, date(1, 10)),
            Some(DateRange::new(date(1, 1), date(1, 10)).unwrap())
        );
        assert_eq!(
            f.engine.plan(&instrument, Some(date(1, 9)), date(1, 10)),
            Some(DateRange::single_day(date(1, 10)))
        );
        assert_eq!(f.engine.plan(&instrument, Some(date(1, 10)), date(1, 10)), None);
        assert_eq!(f.engine.plan(&instrument, Some(date(1, 11)), date(1, 10)), None);
    }
}
