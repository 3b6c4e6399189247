//! Launch ingestor
//!
//! Single entry point for new-launch discovery. Both the historical
//! backfill and the live listener funnel `LaunchCreated` logs through
//! [`Ingestor::ingest_creation`], which resolves the full launch state and
//! writes the initial row exactly once per contract address.

use std::sync::Arc;

use alloy::primitives::{Address, B256};
use alloy::sol_types::SolEvent;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::error::{ChainError, IngestError, StoreError};
use crate::models::launch::{market_cap, progress_percent, LaunchRecord, RawEvent};
use crate::services::chain_reader::{ChainReader, IBondingCurveFactory::LaunchCreated};
use crate::services::launch_store::{InsertOutcome, LaunchStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new row was written
    Created,
    /// The launch was already stored; no chain reads were made
    AlreadyIndexed,
    /// Another ingestion wrote the row between our existence check and insert
    InsertRaced,
}

impl IngestOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, IngestOutcome::Created)
    }
}

/// Fields carried by a decoded `LaunchCreated` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCreation {
    pub launch: Address,
    pub token: Address,
    pub creator: Address,
    pub name: String,
    pub symbol: String,
    pub block_number: u64,
    pub block_timestamp: Option<u64>,
    pub transaction_hash: Option<B256>,
}

/// Decode a raw log as `LaunchCreated`, checking topic0 and the ABI shape.
pub fn decode_launch_created(event: &RawEvent) -> Result<LaunchCreation, ChainError> {
    let decoded = LaunchCreated::decode_raw_log(event.topics.iter().copied(), &event.data, true)
        .map_err(|e| ChainError::decode("LaunchCreated", e.to_string()))?;

    Ok(LaunchCreation {
        launch: decoded.launch,
        token: decoded.token,
        creator: decoded.creator,
        name: decoded.name,
        symbol: decoded.symbol,
        block_number: event.block_number,
        block_timestamp: event.block_timestamp,
        transaction_hash: event.transaction_hash,
    })
}

pub struct Ingestor {
    reader: Arc<dyn ChainReader>,
    store: Arc<dyn LaunchStore>,
    factory: Address,
}

impl Ingestor {
    pub fn new(reader: Arc<dyn ChainReader>, store: Arc<dyn LaunchStore>, factory: Address) -> Self {
        Self {
            reader,
            store,
            factory,
        }
    }

    /// Ingest one creation log. Safe to call repeatedly and concurrently for
    /// the same launch: exactly one row results, holding the data of the
    /// first successful write.
    pub async fn ingest_creation(&self, event: &RawEvent) -> Result<IngestOutcome, IngestError> {
        let creation = match self.decode(event) {
            Ok(creation) => creation,
            Err(source) => {
                error!(
                    block = event.block_number,
                    log_index = event.log_index,
                    error = %source,
                    "Undecodable LaunchCreated log, skipping"
                );
                return Err(IngestError::Chain {
                    launch: None,
                    source,
                });
            }
        };
        let launch = creation.launch;

        let exists = self
            .store
            .exists(launch)
            .await
            .map_err(|source| self.store_failure(launch, "exists", source))?;
        if exists {
            debug!(launch = %launch, "Launch already indexed, skipping");
            return Ok(IngestOutcome::AlreadyIndexed);
        }

        let record = self.resolve_record(&creation).await.map_err(|source| {
            if source.is_transient() {
                warn!(launch = %launch, error = %source, "Failed to resolve launch state");
            } else {
                error!(launch = %launch, error = %source, "Launch returned malformed data");
            }
            IngestError::Chain {
                launch: Some(launch),
                source,
            }
        })?;

        let outcome = self
            .store
            .upsert_create(&record)
            .await
            .map_err(|source| self.store_failure(launch, "upsert_create", source))?;

        match outcome {
            InsertOutcome::Inserted => {
                info!(
                    launch = %launch,
                    name = %record.name,
                    symbol = %record.symbol,
                    block = record.created_at_block,
                    progress = %record.bonding_curve_progress_percent,
                    "Indexed new launch"
                );
                Ok(IngestOutcome::Created)
            }
            InsertOutcome::AlreadyExists => {
                debug!(launch = %launch, "Concurrent ingestion won the insert");
                Ok(IngestOutcome::InsertRaced)
            }
        }
    }

    fn decode(&self, event: &RawEvent) -> Result<LaunchCreation, ChainError> {
        if event.address != self.factory {
            return Err(ChainError::decode(
                "LaunchCreated",
                format!("log emitted by {} instead of the factory", event.address),
            ));
        }
        decode_launch_created(event)
    }

    /// Read every value the initial row needs. All reads must succeed; a
    /// half-populated row is never written.
    async fn resolve_record(&self, creation: &LaunchCreation) -> Result<LaunchRecord, ChainError> {
        let launch = creation.launch;
        let block_time = async {
            match creation.block_timestamp {
                Some(ts) => Ok(ts),
                None => self.reader.block_timestamp(creation.block_number).await,
            }
        };

        let (total_supply, state, metadata, block_time) = tokio::try_join!(
            self.reader.total_supply(launch),
            self.reader.launch_state(launch),
            self.reader.launch_metadata(self.factory, launch),
            block_time,
        )?;

        let created_at_block_time = i64::try_from(block_time)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| {
                ChainError::decode("block_timestamp", format!("invalid timestamp {}", block_time))
            })?;

        Ok(LaunchRecord {
            contract_address: launch,
            token_address: creation.token,
            name: creation.name.clone(),
            symbol: creation.symbol.clone(),
            creator_address: creation.creator,
            created_at_block_time,
            created_at_block: creation.block_number,
            creation_tx_hash: creation.transaction_hash,
            logo_url: metadata.logo_url,
            description: metadata.description,
            website: metadata.website,
            twitter: metadata.twitter,
            telegram: metadata.telegram,
            discord: metadata.discord,
            bonding_curve_progress_percent: progress_percent(state.tokens_sold, total_supply)?,
            market_cap_estimate: market_cap(state.current_price_native, total_supply)?,
            total_supply,
            current_price_native: state.current_price_native,
            tokens_sold: state.tokens_sold,
            native_raised: state.native_raised,
            liquidity_native: state.native_raised,
            is_graduated: state.is_graduated,
            holders_count: 0,
            volume_24h: Decimal::ZERO,
            price_change_24h: Decimal::ZERO,
            verified: false,
            flagged: false,
            last_synced_at: Utc::now(),
        })
    }

    fn store_failure(&self, launch: Address, operation: &'static str, source: StoreError) -> IngestError {
        warn!(launch = %launch, operation = operation, error = %source, "Store operation failed during ingestion");
        IngestError::Store { launch, source }
    }
}
