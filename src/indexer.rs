//! Launch indexer service
//!
//! Explicit service object wiring the pipeline together. `start()` runs the
//! historical backfill to completion, then attaches the live listener and
//! the refresh scheduler. `stop()` drains both within a grace period.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::IndexerSettings;
use crate::error::ChainError;
use crate::jobs::live_listener::{ListenerHandle, ListenerStats, LiveEventListener};
use crate::jobs::refresh_scheduler::{RefreshScheduler, SchedulerHandle, SchedulerStats};
use crate::services::backfill::{BackfillReport, HistoricalBackfiller};
use crate::services::chain_reader::ChainReader;
use crate::services::ingestor::Ingestor;
use crate::services::launch_store::LaunchStore;

enum Lifecycle {
    Stopped,
    Starting,
    Running(RunningTasks),
    Stopping,
}

struct RunningTasks {
    listener: ListenerHandle,
    scheduler: SchedulerHandle,
}

pub struct LaunchIndexer {
    settings: IndexerSettings,
    reader: Arc<dyn ChainReader>,
    ingestor: Arc<Ingestor>,
    scheduler: Arc<RefreshScheduler>,
    lifecycle: Mutex<Lifecycle>,
    /// Interrupts a backfill that is still running when `stop()` is called
    shutdown: watch::Sender<bool>,
    last_backfill: Mutex<Option<BackfillReport>>,
    listener_stats: Mutex<Option<Arc<ListenerStats>>>,
}

impl LaunchIndexer {
    pub fn new(
        settings: IndexerSettings,
        reader: Arc<dyn ChainReader>,
        store: Arc<dyn LaunchStore>,
    ) -> Self {
        let ingestor = Arc::new(Ingestor::new(
            reader.clone(),
            store.clone(),
            settings.factory_address,
        ));
        let scheduler = Arc::new(RefreshScheduler::new(reader.clone(), store, &settings));
        let (shutdown, _) = watch::channel(false);

        Self {
            settings,
            reader,
            ingestor,
            scheduler,
            lifecycle: Mutex::new(Lifecycle::Stopped),
            shutdown,
            last_backfill: Mutex::new(None),
            listener_stats: Mutex::new(None),
        }
    }

    pub fn ingestor(&self) -> Arc<Ingestor> {
        self.ingestor.clone()
    }

    pub fn scheduler_stats(&self) -> Arc<SchedulerStats> {
        self.scheduler.stats()
    }

    pub fn listener_stats(&self) -> Option<Arc<ListenerStats>> {
        self.listener_stats.lock().clone()
    }

    pub fn last_backfill(&self) -> Option<BackfillReport> {
        self.last_backfill.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running(_))
    }

    /// Start the pipeline. Returns `Ok(false)` without doing anything when
    /// the indexer is already starting or running.
    ///
    /// Fails only if the chain tip cannot be read for the initial backfill.
    pub async fn start(&self) -> Result<bool, ChainError> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if !matches!(*lifecycle, Lifecycle::Stopped) {
                info!("Launch indexer is already running");
                return Ok(false);
            }
            *lifecycle = Lifecycle::Starting;
        }

        info!(
            factory = %self.settings.factory_address,
            start_block = self.settings.start_block,
            "Starting launch indexer"
        );
        self.shutdown.send_replace(false);

        let backfiller = HistoricalBackfiller::new(
            self.reader.clone(),
            self.ingestor.clone(),
            self.settings.factory_address,
            self.settings.start_block,
            self.settings.max_block_range,
        );
        let report = match backfiller.run(&self.shutdown.subscribe()).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Historical backfill could not start");
                *self.lifecycle.lock() = Lifecycle::Stopped;
                return Err(e);
            }
        };
        let next_block = report.next_block;
        *self.last_backfill.lock() = Some(report);

        let mut lifecycle = self.lifecycle.lock();
        if *self.shutdown.borrow() {
            info!("Launch indexer stopped during backfill");
            *lifecycle = Lifecycle::Stopped;
            return Ok(false);
        }

        let listener = LiveEventListener::new(
            self.reader.clone(),
            self.ingestor.clone(),
            self.settings.factory_address,
        );
        *self.listener_stats.lock() = Some(listener.stats());
        let listener = listener.spawn(next_block);
        let scheduler = self.scheduler.clone().spawn();

        *lifecycle = Lifecycle::Running(RunningTasks {
            listener,
            scheduler,
        });
        info!(next_block = next_block, "Launch indexer started");

        Ok(true)
    }

    /// Start, run until `shutdown` resolves, then stop.
    ///
    /// The signal is watched from the first moment, so a shutdown during the
    /// backfill interrupts it instead of waiting for it to finish.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), ChainError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let start = self.start();
        tokio::pin!(start);

        let interrupted = tokio::select! {
            started = &mut start => {
                started?;
                false
            }
            _ = &mut shutdown => true,
        };

        if interrupted {
            info!("Shutdown requested during startup");
            self.stop().await;
            // The backfill sees the signal between windows and start() unwinds
            start.await?;
        } else {
            shutdown.await;
            info!("Shutdown signal received");
        }

        self.stop().await;
        Ok(())
    }

    /// Stop the pipeline: no new events are forwarded and no new refresh
    /// cycle begins. In-flight work gets `shutdown_grace` to finish before
    /// it is abandoned. Calling this when not running is a no-op.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);

        let tasks = {
            let mut lifecycle = self.lifecycle.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopping) {
                Lifecycle::Running(tasks) => tasks,
                other => {
                    // Starting: start() notices the signal after backfill
                    *lifecycle = other;
                    return;
                }
            }
        };

        info!("Stopping launch indexer");
        let RunningTasks {
            mut listener,
            mut scheduler,
        } = tasks;
        listener.signal_stop();
        scheduler.signal_stop();

        let drained = tokio::time::timeout(self.settings.shutdown_grace, async {
            if let Err(e) = listener.task_mut().await {
                error!(error = %e, "Live listener task failed");
            }
            if let Err(e) = scheduler.task_mut().await {
                error!(error = %e, "Refresh scheduler task failed");
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                grace_secs = self.settings.shutdown_grace.as_secs_f64(),
                "Shutdown grace period elapsed, abandoning pending work"
            );
            listener.task_mut().abort();
            scheduler.task_mut().abort();
        }

        *self.lifecycle.lock() = Lifecycle::Stopped;
        info!("Launch indexer stopped");
    }
}
