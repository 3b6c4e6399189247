//! Live LaunchCreated listener
//!
//! Keeps a subscription to the factory's `LaunchCreated` logs open and hands
//! every received log to the ingestor, in receipt order. Duplicates are
//! expected (at-least-once feed) and absorbed by the ingestor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::sol_types::SolEvent;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use crate::models::launch::RawEvent;
use crate::services::chain_reader::{ChainReader, IBondingCurveFactory::LaunchCreated};
use crate::services::ingestor::{IngestOutcome, Ingestor};

/// Pause before re-subscribing after the feed ends or fails to open
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
pub struct ListenerStats {
    received: AtomicU64,
    created: AtomicU64,
    failed: AtomicU64,
}

impl ListenerStats {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

pub struct LiveEventListener {
    reader: Arc<dyn ChainReader>,
    ingestor: Arc<Ingestor>,
    factory: Address,
    stats: Arc<ListenerStats>,
    resubscribe_delay: Duration,
}

impl LiveEventListener {
    pub fn new(reader: Arc<dyn ChainReader>, ingestor: Arc<Ingestor>, factory: Address) -> Self {
        Self {
            reader,
            ingestor,
            factory,
            stats: Arc::new(ListenerStats::default()),
            resubscribe_delay: RESUBSCRIBE_DELAY,
        }
    }

    pub fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    pub fn stats(&self) -> Arc<ListenerStats> {
        self.stats.clone()
    }

    /// Start forwarding logs from `from_block` onwards on a background task.
    pub fn spawn(self, from_block: u64) -> ListenerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = self.stats.clone();
        let task = tokio::spawn(async move { self.run(from_block, shutdown_rx).await });

        ListenerHandle {
            shutdown: shutdown_tx,
            task,
            stats,
        }
    }

    /// Forward events until `shutdown` flips to `true`.
    pub async fn run(&self, from_block: u64, mut shutdown: watch::Receiver<bool>) {
        let mut next_block = from_block;

        'subscription: loop {
            if *shutdown.borrow() {
                break;
            }

            match self
                .reader
                .subscribe(self.factory, LaunchCreated::SIGNATURE_HASH, next_block)
                .await
            {
                Ok(mut stream) => {
                    info!(factory = %self.factory, from_block = next_block, "Listening for new launches");

                    loop {
                        tokio::select! {
                            biased;
                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() {
                                    break 'subscription;
                                }
                            }
                            next = stream.next() => match next {
                                Some(event) => {
                                    next_block = next_block.max(event.block_number);
                                    self.forward(&event).await;
                                }
                                None => {
                                    warn!(next_block = next_block, "Live launch feed ended, resubscribing");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, next_block = next_block, "Failed to subscribe to LaunchCreated logs");
                }
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.resubscribe_delay) => {}
            }
        }

        info!(
            received = self.stats.received(),
            created = self.stats.created(),
            failed = self.stats.failed(),
            "Live launch listener stopped"
        );
    }

    async fn forward(&self, event: &RawEvent) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        match self.ingestor.ingest_creation(event).await {
            Ok(IngestOutcome::Created) => {
                self.stats.created.fetch_add(1, Ordering::Relaxed);
            }
            Ok(_) => {}
            // Logged by the ingestor with the launch address
            Err(_) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Owner of a running listener task.
pub struct ListenerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    stats: Arc<ListenerStats>,
}

impl ListenerHandle {
    pub fn stats(&self) -> Arc<ListenerStats> {
        self.stats.clone()
    }

    /// Ask the task to stop. No event received after this is forwarded.
    pub fn signal_stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal and wait for the task to exit.
    pub async fn stop(self) -> Result<(), JoinError> {
        self.signal_stop();
        self.task.await
    }

    pub fn task_mut(&mut self) -> &mut JoinHandle<()> {
        &mut self.task
    }
}
