//! Top-level wiring of registry, store, source, scheduler and queries.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use etftrack_daemon::{HistoryError, RunHistory, RunRecord, Scheduler, SchedulerError};
use etftrack_fetch::{MarketDataClient, TwseClient};
use etftrack_ingest::{
    FleetOrchestrator, IngestionEngine, LastUpdated, Period, QueryService, SeriesView,
};
use etftrack_instruments::{InstrumentRegistry, RegistryError};
use etftrack_store::{IntegrityReport, StorageError, TimeSeriesStore};
use etftrack_types::RunReport;
use thiserror::Error;

use crate::{ConfigError, Settings};

/// Errors that can occur while assembling a [`Tracker`].
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Invalid settings.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The instrument registry could not be loaded.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The data directory could not be opened.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The run history could not be opened.
    #[error(transparent)]
    History(#[from] HistoryError),

    /// The HTTP client could not be created.
    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// The assembled tracker: triggers, schedule and queries over one data
/// directory.
#[derive(Debug, Clone)]
pub struct Tracker {
    settings: Arc<Settings>,
    instruments: Arc<InstrumentRegistry>,
    store: Arc<TimeSeriesStore>,
    scheduler: Scheduler,
    query: QueryService,
    history: RunHistory,
}

impl Tracker {
    /// Assembles a tracker that fetches from TWSE.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings, registry, data directory or HTTP
    /// client cannot be set up.
    pub fn new(settings: Settings) -> Result<Self, TrackerError> {
        let client = TwseClient::new(settings.client_config())?;
        Self::with_client(settings, Arc::new(client))
    }

    /// Assembles a tracker over an arbitrary market-data client.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings, registry or data directory cannot
    /// be set up.
    pub fn with_client(
        settings: Settings,
        client: Arc<dyn MarketDataClient>,
    ) -> Result<Self, TrackerError> {
        settings.validate()?;

        let instruments = Arc::new(match &settings.registry {
            Some(path) => InstrumentRegistry::from_file(path)?,
            None => InstrumentRegistry::builtin(),
        });
        let store = Arc::new(TimeSeriesStore::open(
            &settings.data_dir,
            instruments.codes().map(String::from),
            settings.max_snapshots,
        )?);
        let history = RunHistory::new(&settings.data_dir)?;
        let source = client.name().to_string();

        let engine = IngestionEngine::new(client, Arc::clone(&store), settings.engine_config());
        let orchestrator = FleetOrchestrator::new(
            Arc::new(engine),
            Arc::clone(&instruments),
            settings.orchestrator_config(),
        );
        let scheduler = Scheduler::new(
            orchestrator,
            settings.schedule_config()?,
            Some(history.clone()),
        );
        let query = QueryService::new(Arc::clone(&store), Arc::clone(&instruments));

        tracing::info!(
            data_dir = %settings.data_dir.display(),
            instruments = instruments.len(),
            source = %source,
            "Tracker ready"
        );

        Ok(Self {
            settings: Arc::new(settings),
            instruments,
            store,
            scheduler,
            query,
            history,
        })
    }

    /// Returns the settings in effect.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the instrument registry.
    #[must_use]
    pub fn instruments(&self) -> &InstrumentRegistry {
        &self.instruments
    }

    /// Returns the time-series store.
    #[must_use]
    pub fn store(&self) -> &TimeSeriesStore {
        &self.store
    }

    /// Returns the scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Returns the run history.
    #[must_use]
    pub const fn history(&self) -> &RunHistory {
        &self.history
    }

    /// Runs a full backfill of every instrument.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::RunInProgress`] if a run is active.
    pub async fn init(&self) -> Result<RunReport, SchedulerError> {
        let report = self.scheduler.trigger_init().await?;
        self.prune_history();
        Ok(report)
    }

    /// Runs an incremental update of every instrument.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::RunInProgress`] if a run is active.
    pub async fn update(&self) -> Result<RunReport, SchedulerError> {
        let report = self.scheduler.trigger_update().await?;
        self.prune_history();
        Ok(report)
    }

    /// Starts periodic updates. Returns false if already started.
    pub fn start_schedule(&self) -> bool {
        self.scheduler.start_schedule()
    }

    /// Stops periodic updates.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    /// Returns the last stored date of every instrument, in registry order.
    #[must_use]
    pub fn list_last_updated(&self) -> Vec<LastUpdated> {
        self.query.list_last_updated()
    }

    /// Returns the last stored date of each known code.
    #[must_use]
    pub fn last_updated<S: AsRef<str>>(&self, ids: &[S]) -> BTreeMap<String, Option<NaiveDate>> {
        self.query.last_updated(ids)
    }

    /// Returns points in `[from, to]` and watermarks for the known codes.
    #[must_use]
    pub fn query<S: AsRef<str>>(
        &self,
        ids: &[S],
        from: NaiveDate,
        to: NaiveDate,
    ) -> BTreeMap<String, SeriesView> {
        self.query.query(ids, from, to)
    }

    /// Returns each known code's points for `period`, anchored at its own
    /// watermark.
    #[must_use]
    pub fn query_period<S: AsRef<str>>(
        &self,
        ids: &[S],
        period: Period,
    ) -> BTreeMap<String, SeriesView> {
        self.query.query_period(ids, period)
    }

    /// Runs the integrity checks on one instrument.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown codes or unreadable data.
    pub fn integrity(&self, code: &str) -> Result<IntegrityReport, StorageError> {
        let code = self
            .instruments
            .get(code)
            .map_or(code, |instrument| instrument.code());
        self.store.integrity(code)
    }

    /// Returns the most recent persisted run.
    ///
    /// # Errors
    ///
    /// Returns an error if the history directory cannot be read.
    pub fn latest_run(&self) -> Result<Option<RunRecord>, HistoryError> {
        self.history.latest()
    }

    fn prune_history(&self) {
        match self.history.prune(self.settings.keep_runs) {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "Pruned run history"),
            Err(e) => tracing::warn!(error = %e, "Failed to prune run history"),
        }
    }
}
