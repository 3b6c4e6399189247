//! Historical backfill
//!
//! Walks `LaunchCreated` logs from the configured start block up to the
//! chain tip observed at startup and ingests each one. Runs once, before
//! the live listener attaches, so the listener can start right after the
//! scanned range.

use std::sync::Arc;

use alloy::primitives::Address;
use alloy::sol_types::SolEvent;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::ChainError;
use crate::models::launch::RawEvent;
use crate::services::chain_reader::{ChainReader, IBondingCurveFactory::LaunchCreated};
use crate::services::ingestor::{IngestOutcome, Ingestor};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Chain tip at the time the scan started
    pub scanned_to: u64,
    /// First block the live listener should cover
    pub next_block: u64,
    pub events: usize,
    pub created: usize,
    pub already_indexed: usize,
    pub failed: usize,
    /// Inclusive block windows that could not be fetched
    pub failed_ranges: Vec<(u64, u64)>,
    /// Shutdown was requested before the scan finished
    pub interrupted: bool,
}

pub struct HistoricalBackfiller {
    reader: Arc<dyn ChainReader>,
    ingestor: Arc<Ingestor>,
    factory: Address,
    start_block: u64,
    max_block_range: u64,
}

impl HistoricalBackfiller {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        ingestor: Arc<Ingestor>,
        factory: Address,
        start_block: u64,
        max_block_range: u64,
    ) -> Self {
        Self {
            reader,
            ingestor,
            factory,
            start_block,
            max_block_range: max_block_range.max(1),
        }
    }

    /// Scan `[start_block, tip]`. Only failing to read the tip is an error;
    /// everything after that is logged, counted and skipped.
    pub async fn run(&self, shutdown: &watch::Receiver<bool>) -> Result<BackfillReport, ChainError> {
        let tip = self.reader.latest_block().await?;
        let mut report = BackfillReport {
            scanned_to: tip,
            next_block: self.start_block.max(tip.saturating_add(1)),
            ..Default::default()
        };

        if self.start_block > tip {
            info!(
                start_block = self.start_block,
                tip = tip,
                "Start block is ahead of the chain tip, nothing to backfill"
            );
            return Ok(report);
        }

        info!(
            factory = %self.factory,
            from_block = self.start_block,
            to_block = tip,
            "Backfilling LaunchCreated events"
        );

        let mut from = self.start_block;
        let mut span = self.max_block_range;

        while from <= tip {
            if *shutdown.borrow() {
                info!(next_block = from, "Shutdown requested, stopping backfill early");
                report.interrupted = true;
                break;
            }

            let to = tip.min(from.saturating_add(span - 1));
            match self
                .reader
                .get_logs(self.factory, LaunchCreated::SIGNATURE_HASH, from, to)
                .await
            {
                Ok(events) => {
                    debug!(from_block = from, to_block = to, count = events.len(), "Backfill window fetched");
                    self.ingest_all(&events, &mut report).await;
                    from = to + 1;
                }
                Err(ChainError::RangeTooLarge { .. }) if to > from => {
                    span = ((to - from + 1) / 2).max(1);
                    debug!(from_block = from, span = span, "Range too large, halving backfill window");
                }
                Err(e) => {
                    warn!(
                        from_block = from,
                        to_block = to,
                        error = %e,
                        "Failed to fetch backfill window, skipping"
                    );
                    report.failed_ranges.push((from, to));
                    from = to + 1;
                }
            }
        }

        info!(
            events = report.events,
            created = report.created,
            already_indexed = report.already_indexed,
            failed = report.failed,
            failed_ranges = report.failed_ranges.len(),
            scanned_to = report.scanned_to,
            "Backfill complete"
        );

        Ok(report)
    }

    async fn ingest_all(&self, events: &[RawEvent], report: &mut BackfillReport) {
        for event in events {
            report.events += 1;
            match self.ingestor.ingest_creation(event).await {
                Ok(IngestOutcome::Created) => report.created += 1,
                Ok(IngestOutcome::AlreadyIndexed | IngestOutcome::InsertRaced) => {
                    report.already_indexed += 1
                }
                // Already logged by the ingestor with the launch address
                Err(_) => report.failed += 1,
            }
        }
    }
}
