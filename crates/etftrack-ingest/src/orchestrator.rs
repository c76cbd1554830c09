//! Fleet-wide ingestion runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{Local, NaiveDate, Utc};
use etftrack_instruments::InstrumentRegistry;
use etftrack_types::{ErrorDetail, ErrorKind, IngestionOutcome, Instrument, Mode, RunReport};
use futures::stream::{self, StreamExt};
use tokio::time::Instant;

use crate::IngestionEngine;

/// Orchestrator configuration.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    /// Maximum instruments ingested at once.
    pub concurrency: usize,
    /// Limit for a whole run.
    pub run_deadline: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            run_deadline: Duration::from_secs(3600),
        }
    }
}

/// Runs the ingestion engine over every registered instrument.
///
/// Instruments are processed by a bounded pool; one instrument's failure
/// never cancels or delays the others. When the run deadline passes, the
/// instruments still in flight are cancelled and those not yet started are
/// skipped. Both are reported as timeout failures, so the report always has
/// one outcome per instrument, in registry order.
#[derive(Debug, Clone)]
pub struct FleetOrchestrator {
    engine: Arc<IngestionEngine>,
    instruments: Arc<InstrumentRegistry>,
    config: OrchestratorConfig,
}

impl FleetOrchestrator {
    /// Creates a new orchestrator.
    #[must_use]
    pub fn new(
        engine: Arc<IngestionEngine>,
        instruments: Arc<InstrumentRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            engine,
            instruments,
            config,
        }
    }

    /// Returns the instruments this orchestrator runs over.
    #[must_use]
    pub const fn instruments(&self) -> &Arc<InstrumentRegistry> {
        &self.instruments
    }

    /// Runs every instrument up to today's local date.
    pub async fn run(&self, mode: Mode) -> RunReport {
        self.run_as_of(mode, Local::now().date_naive()).await
    }

    /// Runs every instrument up to `today`.
    pub async fn run_as_of(&self, mode: Mode, today: NaiveDate) -> RunReport {
        let started_at = Utc::now();
        let deadline = Instant::now() + self.config.run_deadline;
        let total = self.instruments.len();
        tracing::info!(mode = %mode, instruments = total, "Run started");

        let started: Arc<[AtomicBool]> = (0..total).map(|_| AtomicBool::new(false)).collect();
        let mut outcomes: Vec<Option<IngestionOutcome>> = vec![None; total];

        {
            let queue: Vec<Instrument> = self.instruments.all().cloned().collect();
            let mut pending = stream::iter(queue.into_iter().enumerate())
                .map(|(i, instrument)| {
                    let engine = Arc::clone(&self.engine);
                    let started = Arc::clone(&started);
                    async move {
                        started[i].store(true, Ordering::Relaxed);
                        (i, engine.run_as_of(&instrument, mode, today).await)
                    }
                })
                .buffer_unordered(self.config.concurrency.max(1));

            loop {
                match tokio::time::timeout_at(deadline, pending.next()).await {
                    Ok(Some((i, outcome))) => outcomes[i] = Some(outcome),
                    Ok(None) => break,
                    Err(_) => {
                        tracing::warn!(
                            deadline_secs = self.config.run_deadline.as_secs(),
                            "Run deadline exceeded, cancelling remaining instruments"
                        );
                        break;
                    }
                }
            }
        }

        let outcomes = self
            .instruments
            .all()
            .zip(outcomes)
            .enumerate()
            .map(|(i, (instrument, outcome))| {
                outcome.unwrap_or_else(|| {
                    let message = if started[i].load(Ordering::Relaxed) {
                        "cancelled at the run deadline"
                    } else {
                        "not started before the run deadline"
                    };
                    IngestionOutcome::failed(
                        instrument.code(),
                        mode,
                        None,
                        0,
                        ErrorDetail::new(ErrorKind::Timeout, message),
                    )
                })
            })
            .collect();

        let report = RunReport {
            mode,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };
        tracing::info!(
            mode = %mode,
            status = %report.status(),
            merged = report.records_merged(),
            failures = report.failures().count(),
            "Run finished"
        );
        report
    }
}
