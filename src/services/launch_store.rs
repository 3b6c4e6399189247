//! Launch record store
//!
//! Persistence seam for the read model. `upsert_create` is a conditional
//! insert keyed on the contract address, so two racing ingestions of the
//! same launch produce one row and no error.

use std::collections::HashMap;
use std::str::FromStr;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use tracing::debug;

use crate::entities::{launches, prelude::Launches};
use crate::error::StoreError;
use crate::models::launch::{address_key, LaunchRecord, MutableFields};

/// Result of a conditional insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row with this key already existed; nothing was written.
    AlreadyExists,
}

#[async_trait]
pub trait LaunchStore: Send + Sync {
    async fn exists(&self, address: Address) -> Result<bool, StoreError>;

    async fn find(&self, address: Address) -> Result<Option<LaunchRecord>, StoreError>;

    /// Insert unless the key exists. Never overwrites.
    async fn upsert_create(&self, record: &LaunchRecord) -> Result<InsertOutcome, StoreError>;

    /// Write the mutable subset. `NotFound` if the key was never created.
    async fn update_mutable_fields(
        &self,
        address: Address,
        fields: &MutableFields,
    ) -> Result<(), StoreError>;

    /// Addresses of every launch that has not graduated, oldest first.
    async fn find_active(&self) -> Result<Vec<Address>, StoreError>;
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct SeaOrmLaunchStore {
    db: DatabaseConnection,
}

impl SeaOrmLaunchStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LaunchStore for SeaOrmLaunchStore {
    async fn exists(&self, address: Address) -> Result<bool, StoreError> {
        let count = Launches::find()
            .filter(launches::Column::ContractAddress.eq(address_key(&address)))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn find(&self, address: Address) -> Result<Option<LaunchRecord>, StoreError> {
        Launches::find()
            .filter(launches::Column::ContractAddress.eq(address_key(&address)))
            .one(&self.db)
            .await?
            .map(record_from_model)
            .transpose()
    }

    async fn upsert_create(&self, record: &LaunchRecord) -> Result<InsertOutcome, StoreError> {
        let model = active_model_from_record(record)?;

        let rows = Launches::insert(model)
            .on_conflict(
                OnConflict::column(launches::Column::ContractAddress)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        if rows == 0 {
            debug!(launch = %record.contract_address, "Insert ignored, launch already stored");
            Ok(InsertOutcome::AlreadyExists)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    async fn update_mutable_fields(
        &self,
        address: Address,
        fields: &MutableFields,
    ) -> Result<(), StoreError> {
        let synced_at: sea_orm::prelude::DateTimeWithTimeZone = fields.last_synced_at.into();

        let mut update = Launches::update_many()
            .col_expr(
                launches::Column::CurrentPriceNative,
                Expr::value(fields.current_price_native),
            )
            .col_expr(launches::Column::TokensSold, Expr::value(fields.tokens_sold))
            .col_expr(launches::Column::NativeRaised, Expr::value(fields.native_raised))
            .col_expr(launches::Column::LiquidityNative, Expr::value(fields.liquidity_native))
            .col_expr(
                launches::Column::BondingCurveProgressPercent,
                Expr::value(fields.bonding_curve_progress_percent),
            )
            .col_expr(
                launches::Column::MarketCapEstimate,
                Expr::value(fields.market_cap_estimate),
            )
            .col_expr(launches::Column::LastSyncedAt, Expr::value(synced_at))
            .filter(launches::Column::ContractAddress.eq(address_key(&address)));

        // One-way flag: only ever set, never cleared
        if fields.is_graduated {
            update = update.col_expr(launches::Column::IsGraduated, Expr::value(true));
        }

        let result = update.exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound { address });
        }
        Ok(())
    }

    async fn find_active(&self) -> Result<Vec<Address>, StoreError> {
        Launches::find()
            .filter(launches::Column::IsGraduated.eq(false))
            .order_by_asc(launches::Column::Id)
            .all(&self.db)
            .await?
            .iter()
            .map(|m| parse_address(&m.contract_address, &m.contract_address))
            .collect()
    }
}

fn active_model_from_record(record: &LaunchRecord) -> Result<launches::ActiveModel, StoreError> {
    let key = address_key(&record.contract_address);
    let created_at_block = i64::try_from(record.created_at_block).map_err(|e| StoreError::Corrupt {
        key: key.clone(),
        message: format!("block number: {}", e),
    })?;

    Ok(launches::ActiveModel {
        contract_address: Set(key),
        token_address: Set(address_key(&record.token_address)),
        name: Set(record.name.clone()),
        symbol: Set(record.symbol.clone()),
        creator_address: Set(address_key(&record.creator_address)),
        created_at_block_time: Set(record.created_at_block_time.into()),
        created_at_block: Set(created_at_block),
        creation_tx_hash: Set(record.creation_tx_hash.map(|h| format!("{:?}", h))),
        logo_url: Set(record.logo_url.clone()),
        description: Set(record.description.clone()),
        website: Set(record.website.clone()),
        twitter: Set(record.twitter.clone()),
        telegram: Set(record.telegram.clone()),
        discord: Set(record.discord.clone()),
        total_supply: Set(record.total_supply),
        current_price_native: Set(record.current_price_native),
        tokens_sold: Set(record.tokens_sold),
        native_raised: Set(record.native_raised),
        liquidity_native: Set(record.liquidity_native),
        bonding_curve_progress_percent: Set(record.bonding_curve_progress_percent),
        market_cap_estimate: Set(record.market_cap_estimate),
        is_graduated: Set(record.is_graduated),
        holders_count: Set(record.holders_count),
        volume_24h: Set(record.volume_24h),
        price_change_24h: Set(record.price_change_24h),
        verified: Set(record.verified),
        flagged: Set(record.flagged),
        last_synced_at: Set(record.last_synced_at.into()),
        ..Default::default()
    })
}

fn record_from_model(model: launches::Model) -> Result<LaunchRecord, StoreError> {
    let key = model.contract_address.clone();
    let corrupt = |message: String| StoreError::Corrupt {
        key: key.clone(),
        message,
    };

    let creation_tx_hash = model
        .creation_tx_hash
        .as_deref()
        .map(B256::from_str)
        .transpose()
        .map_err(|e| corrupt(format!("tx hash: {}", e)))?;
    let created_at_block =
        u64::try_from(model.created_at_block).map_err(|e| corrupt(format!("block number: {}", e)))?;

    Ok(LaunchRecord {
        contract_address: parse_address(&key, &model.contract_address)?,
        token_address: parse_address(&key, &model.token_address)?,
        name: model.name,
        symbol: model.symbol,
        creator_address: parse_address(&key, &model.creator_address)?,
        created_at_block_time: model.created_at_block_time.with_timezone(&Utc),
        created_at_block,
        creation_tx_hash,
        logo_url: model.logo_url,
        description: model.description,
        website: model.website,
        twitter: model.twitter,
        telegram: model.telegram,
        discord: model.discord,
        total_supply: model.total_supply,
        current_price_native: model.current_price_native,
        tokens_sold: model.tokens_sold,
        native_raised: model.native_raised,
        liquidity_native: model.liquidity_native,
        bonding_curve_progress_percent: model.bonding_curve_progress_percent,
        is_graduated: model.is_graduated,
        market_cap_estimate: model.market_cap_estimate,
        holders_count: model.holders_count,
        volume_24h: model.volume_24h,
        price_change_24h: model.price_change_24h,
        verified: model.verified,
        flagged: model.flagged,
        last_synced_at: model.last_synced_at.with_timezone(&Utc),
    })
}

fn parse_address(key: &str, value: &str) -> Result<Address, StoreError> {
    Address::from_str(value).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        message: format!("address {}: {}", value, e),
    })
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<Address, LaunchRecord>,
    /// Insertion order, so `find_active` matches the Postgres ordering
    order: Vec<Address>,
}

/// In-process store. Each operation runs under a single lock, which gives
/// the same per-key atomicity as the database's unique constraint.
#[derive(Default)]
pub struct MemoryLaunchStore {
    state: RwLock<MemoryState>,
}

impl MemoryLaunchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored record, in insertion order.
    pub fn records(&self) -> Vec<LaunchRecord> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|address| state.records.get(address).cloned())
            .collect()
    }

    pub fn get(&self, address: Address) -> Option<LaunchRecord> {
        self.state.read().records.get(&address).cloned()
    }
}

#[async_trait]
impl LaunchStore for MemoryLaunchStore {
    async fn exists(&self, address: Address) -> Result<bool, StoreError> {
        Ok(self.state.read().records.contains_key(&address))
    }

    async fn find(&self, address: Address) -> Result<Option<LaunchRecord>, StoreError> {
        Ok(self.get(address))
    }

    async fn upsert_create(&self, record: &LaunchRecord) -> Result<InsertOutcome, StoreError> {
        let mut state = self.state.write();
        if state.records.contains_key(&record.contract_address) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        state.order.push(record.contract_address);
        state.records.insert(record.contract_address, record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn update_mutable_fields(
        &self,
        address: Address,
        fields: &MutableFields,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let record = state
            .records
            .get_mut(&address)
            .ok_or(StoreError::NotFound { address })?;
        fields.apply_to(record);
        Ok(())
    }

    async fn find_active(&self) -> Result<Vec<Address>, StoreError> {
        let state = self.state.read();
        Ok(state
            .order
            .iter()
            .filter(|address| {
                state
                    .records
                    .get(*address)
                    .is_some_and(|record| !record.is_graduated)
            })
            .copied()
            .collect())
    }
}
