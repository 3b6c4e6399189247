//! Launch refresh scheduler
//!
//! Re-reads live bonding-curve state for every launch that has not yet
//! graduated and writes the mutable fields back to the store.
//!
//! Cycles never overlap: the next cycle is scheduled from the end of the
//! previous one (`max(period - elapsed, min_backoff)`), so slow RPC calls
//! stretch the schedule instead of stacking concurrent cycles. A shutdown
//! signal lets the in-flight cycle finish before the loop exits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use chrono::Utc;
use futures_util::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::IndexerSettings;
use crate::error::{ChainError, RefreshError, StoreError};
use crate::models::launch::MutableFields;
use crate::services::chain_reader::ChainReader;
use crate::services::launch_store::LaunchStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Default)]
pub struct SchedulerStats {
    cycles_started: AtomicU64,
    cycles_completed: AtomicU64,
    refreshed: AtomicU64,
    failed: AtomicU64,
}

impl SchedulerStats {
    pub fn cycles_started(&self) -> u64 {
        self.cycles_started.load(Ordering::SeqCst)
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::SeqCst)
    }

    pub fn refreshed(&self) -> u64 {
        self.refreshed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Summary of one refresh cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub active: usize,
    pub refreshed: usize,
    pub graduated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated,
    /// This refresh observed the launch graduating
    Graduated,
}

pub struct RefreshScheduler {
    reader: Arc<dyn ChainReader>,
    store: Arc<dyn LaunchStore>,
    period: Duration,
    min_backoff: Duration,
    concurrency: usize,
    state: Mutex<SchedulerState>,
    stats: Arc<SchedulerStats>,
}

impl RefreshScheduler {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        store: Arc<dyn LaunchStore>,
        settings: &IndexerSettings,
    ) -> Self {
        Self {
            reader,
            store,
            period: settings.refresh_interval,
            min_backoff: settings.refresh_min_backoff,
            concurrency: settings.refresh_concurrency.max(1),
            state: Mutex::new(SchedulerState::Idle),
            stats: Arc::new(SchedulerStats::default()),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        self.stats.clone()
    }

    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = self.clone();
        let task = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

        SchedulerHandle {
            shutdown: shutdown_tx,
            task,
            scheduler: self,
        }
    }

    /// Run cycles until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            period_secs = self.period.as_secs_f64(),
            concurrency = self.concurrency,
            "Launch refresh scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            *self.state.lock() = SchedulerState::Running;
            let report = self.run_cycle().await;
            *self.state.lock() = SchedulerState::Idle;

            let elapsed = started.elapsed();
            if elapsed > self.period {
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    period_ms = self.period.as_millis() as u64,
                    active = report.active,
                    "Refresh cycle overran its period"
                );
            }

            let delay = self.period.saturating_sub(elapsed).max(self.min_backoff);
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        *self.state.lock() = SchedulerState::Stopped;
        info!(
            cycles = self.stats.cycles_completed(),
            "Launch refresh scheduler stopped"
        );
    }

    /// Refresh every active launch once. Per-launch failures are logged and
    /// counted, never propagated.
    pub async fn run_cycle(&self) -> CycleReport {
        self.stats.cycles_started.fetch_add(1, Ordering::SeqCst);
        let mut report = CycleReport::default();

        let active = match self.store.find_active().await {
            Ok(active) => active,
            Err(e) => {
                warn!(error = %e, "Failed to load active launches, skipping cycle");
                self.stats.cycles_completed.fetch_add(1, Ordering::SeqCst);
                return report;
            }
        };
        report.active = active.len();

        // Bounded fan-out: at most `concurrency` launches in flight
        let mut queue = active.into_iter();
        let mut in_flight = FuturesUnordered::new();
        for launch in queue.by_ref().take(self.concurrency) {
            in_flight.push(self.refresh_tracked(launch));
        }

        while let Some((launch, result)) = in_flight.next().await {
            if let Some(next) = queue.next() {
                in_flight.push(self.refresh_tracked(next));
            }

            match result {
                Ok(outcome) => {
                    report.refreshed += 1;
                    if outcome == RefreshOutcome::Graduated {
                        report.graduated += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    log_refresh_failure(launch, &e);
                }
            }
        }

        self.stats.refreshed.fetch_add(report.refreshed as u64, Ordering::Relaxed);
        self.stats.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
        self.stats.cycles_completed.fetch_add(1, Ordering::SeqCst);

        if report.failed > 0 {
            warn!(
                active = report.active,
                refreshed = report.refreshed,
                failed = report.failed,
                graduated = report.graduated,
                "Refresh cycle finished with failures"
            );
        } else {
            debug!(
                active = report.active,
                refreshed = report.refreshed,
                graduated = report.graduated,
                "Refresh cycle complete"
            );
        }

        report
    }

    async fn refresh_tracked(&self, launch: Address) -> (Address, Result<RefreshOutcome, RefreshError>) {
        (launch, self.refresh_one(launch).await)
    }

    /// Re-read one launch and write its mutable fields.
    pub async fn refresh_one(&self, launch: Address) -> Result<RefreshOutcome, RefreshError> {
        let record = self
            .store
            .find(launch)
            .await?
            .ok_or(StoreError::NotFound { address: launch })?;

        let state = self.reader.launch_state(launch).await?;

        if record.is_graduated && !state.is_graduated {
            warn!(
                launch = %launch,
                "Chain reports a graduated launch as not graduated; keeping stored flag"
            );
        }

        let fields = MutableFields::derive(record.total_supply, &state, Utc::now())?;
        self.store.update_mutable_fields(launch, &fields).await?;

        if state.is_graduated && !record.is_graduated {
            info!(
                launch = %launch,
                symbol = %record.symbol,
                native_raised = %fields.native_raised,
                "Launch graduated"
            );
            return Ok(RefreshOutcome::Graduated);
        }

        Ok(RefreshOutcome::Updated)
    }
}

fn log_refresh_failure(launch: Address, err: &RefreshError) {
    match err {
        RefreshError::Store(StoreError::NotFound { .. }) => {
            error!(launch = %launch, error = %err, "Active launch missing from store");
        }
        RefreshError::Chain(ChainError::Decode { .. }) => {
            error!(launch = %launch, error = %err, "Launch returned malformed data, skipping");
        }
        _ => {
            warn!(launch = %launch, error = %err, "Failed to refresh launch, skipping");
        }
    }
}

/// Owner of a running scheduler task.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    scheduler: Arc<RefreshScheduler>,
}

impl SchedulerHandle {
    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        self.scheduler.stats()
    }

    /// Ask the loop to stop after the in-flight cycle.
    pub fn signal_stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal and wait for the loop to drain.
    pub async fn stop(self) -> Result<(), JoinError> {
        self.signal_stop();
        self.task.await
    }

    pub fn task_mut(&mut self) -> &mut JoinHandle<()> {
        &mut self.task
    }
}
