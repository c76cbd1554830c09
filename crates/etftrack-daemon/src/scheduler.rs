//! Periodic and on-demand ingestion runs.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use etftrack_ingest::FleetOrchestrator;
use etftrack_types::{Mode, RunReport};
use thiserror::Error;
use tokio::sync::{OwnedMutexGuard, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::{RunHistory, RunRecord, Trigger};

/// Errors returned by on-demand triggers.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// Another run holds the run lock.
    #[error("An ingestion run is already in progress")]
    RunInProgress,
}

/// Timer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Period between scheduled Update runs.
    pub interval: Duration,
    /// Local wall-clock time of the first tick. Without it the first tick
    /// fires immediately.
    pub daily_at: Option<NaiveTime>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60),
            daily_at: None,
        }
    }
}

/// Observable scheduler state.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    /// When the most recent run started.
    pub last_run_started: Option<DateTime<Utc>>,
    /// Report of the most recent finished run.
    pub last_report: Option<RunReport>,
    /// Runs finished since the state was created.
    pub runs_completed: u64,
    /// Timer ticks skipped because a run was active.
    pub ticks_skipped: u64,
}

#[derive(Debug)]
struct Inner {
    orchestrator: FleetOrchestrator,
    history: Option<RunHistory>,
    config: ScheduleConfig,
    state: Arc<Mutex<SchedulerState>>,
    run_lock: Arc<tokio::sync::Mutex<()>>,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

/// Triggers fleet runs on a timer and on demand.
///
/// At most one run executes at a time. A timer tick that finds a run in
/// progress is skipped rather than queued, and an on-demand trigger fails
/// with [`SchedulerError::RunInProgress`]. Ticks are laid out from a fixed
/// origin, so a slow run does not shift later ticks.
#[derive(Debug, Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Creates a scheduler with fresh state. Every finished run is
    /// persisted to `history` when one is given.
    #[must_use]
    pub fn new(
        orchestrator: FleetOrchestrator,
        config: ScheduleConfig,
        history: Option<RunHistory>,
    ) -> Self {
        let state = Arc::new(Mutex::new(SchedulerState::default()));
        Self::with_state(orchestrator, config, history, state)
    }

    /// Creates a scheduler over an existing state object.
    #[must_use]
    pub fn with_state(
        orchestrator: FleetOrchestrator,
        config: ScheduleConfig,
        history: Option<RunHistory>,
        state: Arc<Mutex<SchedulerState>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                orchestrator,
                history,
                config,
                state,
                run_lock: Arc::new(tokio::sync::Mutex::new(())),
                task: Mutex::new(None),
                shutdown,
            }),
        }
    }

    /// Returns the timer configuration.
    #[must_use]
    pub fn config(&self) -> ScheduleConfig {
        self.inner.config
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        lock(&self.inner.state).clone()
    }

    /// Returns true if a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.run_lock.try_lock().is_err()
    }

    /// Runs a full backfill now.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::RunInProgress`] if a run is active.
    pub async fn trigger_init(&self) -> Result<RunReport, SchedulerError> {
        self.trigger(Mode::Init).await
    }

    /// Runs an incremental update now.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::RunInProgress`] if a run is active.
    pub async fn trigger_update(&self) -> Result<RunReport, SchedulerError> {
        self.trigger(Mode::Update).await
    }

    async fn trigger(&self, mode: Mode) -> Result<RunReport, SchedulerError> {
        let guard = Arc::clone(&self.inner.run_lock)
            .try_lock_owned()
            .map_err(|_| SchedulerError::RunInProgress)?;
        Ok(execute(&self.inner, guard, mode, Trigger::Manual).await)
    }

    /// Starts the timer task. Returns false if it was already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_schedule(&self) -> bool {
        let mut task = lock(&self.inner.task);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            tracing::debug!("Schedule already running");
            return false;
        }

        self.inner.shutdown.send_replace(false);
        let shutdown = self.inner.shutdown.subscribe();
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(tick_loop(inner, shutdown)));
        true
    }

    /// Stops the timer task and waits for it to exit. A run already in
    /// progress finishes in the background.
    pub async fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        let task = lock(&self.inner.task).take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "Schedule task ended abnormally");
        }
    }
}

async fn tick_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let config = inner.config;
    let delay = config
        .daily_at
        .and_then(|at| until_next_daily(&Local::now(), at))
        .unwrap_or(Duration::ZERO);

    let mut ticks = tokio::time::interval_at(Instant::now() + delay, config.interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(
        interval_secs = config.interval.as_secs(),
        first_tick_in_secs = delay.as_secs(),
        "Schedule started"
    );

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                match Arc::clone(&inner.run_lock).try_lock_owned() {
                    Ok(guard) => {
                        let inner = Arc::clone(&inner);
                        tokio::spawn(async move {
                            execute(&inner, guard, Mode::Update, Trigger::Schedule).await;
                        });
                    }
                    Err(_) => {
                        lock(&inner.state).ticks_skipped += 1;
                        tracing::warn!("Run still in progress, skipping scheduled tick");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::info!("Schedule stopped");
}

/// Runs the fleet while holding the run lock and records the result.
async fn execute(
    inner: &Inner,
    guard: OwnedMutexGuard<()>,
    mode: Mode,
    trigger: Trigger,
) -> RunReport {
    lock(&inner.state).last_run_started = Some(Utc::now());
    tracing::info!(mode = %mode, trigger = %trigger, "Starting run");

    let report = inner.orchestrator.run(mode).await;

    if let Some(history) = &inner.history
        && let Err(e) = history.save(&RunRecord::new(trigger, report.clone()))
    {
        tracing::warn!(error = %e, "Failed to persist run report");
    }
    {
        let mut state = lock(&inner.state);
        state.last_report = Some(report.clone());
        state.runs_completed += 1;
    }
    drop(guard);
    report
}

/// Time from `now` until the next occurrence of wall-clock time `at`.
fn until_next_daily<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> Option<Duration> {
    let today = now.date_naive().and_time(at);
    let mut next = now.timezone().from_local_datetime(&today).earliest()?;
    if next <= *now {
        let tomorrow = today.checked_add_days(chrono::Days::new(1))?;
        next = now.timezone().from_local_datetime(&tomorrow).earliest()?;
    }
    (next - now.clone()).to_std().ok()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
