//! Launch read-model types
//!
//! `LaunchRecord` is the row synchronized from the chain. Creation-time
//! fields are written once by the ingestor; `MutableFields` is the only
//! shape the refresh path is allowed to write.

use alloy::primitives::{Address, Bytes, B256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ChainError;

/// A log as returned by the node, before ABI decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Emitting contract
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    /// Only some nodes include this in log responses
    pub block_timestamp: Option<u64>,
    pub transaction_hash: Option<B256>,
    pub log_index: u64,
}

/// Live bonding-curve state of a launch contract, in whole-token units.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchState {
    pub current_price_native: Decimal,
    pub tokens_sold: Decimal,
    pub native_raised: Decimal,
    pub is_graduated: bool,
}

/// Optional presentation metadata kept by the factory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchMetadata {
    pub logo_url: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub twitter: Option<String>,
    pub telegram: Option<String>,
    pub discord: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchRecord {
    pub contract_address: Address,
    pub token_address: Address,
    pub name: String,
    pub symbol: String,
    pub creator_address: Address,
    pub created_at_block_time: DateTime<Utc>,
    pub created_at_block: u64,
    pub creation_tx_hash: Option<B256>,

    pub logo_url: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub twitter: Option<String>,
    pub telegram: Option<String>,
    pub discord: Option<String>,

    pub total_supply: Decimal,
    pub current_price_native: Decimal,
    pub tokens_sold: Decimal,
    pub native_raised: Decimal,
    pub liquidity_native: Decimal,
    pub bonding_curve_progress_percent: Decimal,
    pub is_graduated: bool,
    pub market_cap_estimate: Decimal,

    /// No on-chain source; stays at zero
    pub holders_count: i32,
    /// Owned by trade ingestion, which this crate does not do
    pub volume_24h: Decimal,
    pub price_change_24h: Decimal,

    /// Moderation flags, never written after creation
    pub verified: bool,
    pub flagged: bool,

    pub last_synced_at: DateTime<Utc>,
}

/// The mutable subset of a record, with derived fields already computed.
#[derive(Debug, Clone, PartialEq)]
pub struct MutableFields {
    pub current_price_native: Decimal,
    pub tokens_sold: Decimal,
    pub native_raised: Decimal,
    pub liquidity_native: Decimal,
    pub bonding_curve_progress_percent: Decimal,
    pub market_cap_estimate: Decimal,
    /// Applied only when `true`; the store never clears the flag.
    pub is_graduated: bool,
    pub last_synced_at: DateTime<Utc>,
}

impl MutableFields {
    /// Build the refresh write for a launch with the given fixed supply.
    pub fn derive(
        total_supply: Decimal,
        state: &LaunchState,
        now: DateTime<Utc>,
    ) -> Result<Self, ChainError> {
        Ok(Self {
            current_price_native: state.current_price_native,
            tokens_sold: state.tokens_sold,
            native_raised: state.native_raised,
            liquidity_native: state.native_raised,
            bonding_curve_progress_percent: progress_percent(state.tokens_sold, total_supply)?,
            market_cap_estimate: market_cap(state.current_price_native, total_supply)?,
            is_graduated: state.is_graduated,
            last_synced_at: now,
        })
    }

    /// Overlay these fields on a stored record, honoring the one-way
    /// graduation flag.
    pub fn apply_to(&self, record: &mut LaunchRecord) {
        record.current_price_native = self.current_price_native;
        record.tokens_sold = self.tokens_sold;
        record.native_raised = self.native_raised;
        record.liquidity_native = self.liquidity_native;
        record.bonding_curve_progress_percent = self.bonding_curve_progress_percent;
        record.market_cap_estimate = self.market_cap_estimate;
        record.is_graduated |= self.is_graduated;
        record.last_synced_at = self.last_synced_at;
    }
}

/// `tokens_sold / total_supply * 100`, zero for an empty supply.
pub fn progress_percent(tokens_sold: Decimal, total_supply: Decimal) -> Result<Decimal, ChainError> {
    if total_supply.is_zero() {
        return Ok(Decimal::ZERO);
    }
    tokens_sold
        .checked_div(total_supply)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map(|p| p.normalize())
        .ok_or_else(|| ChainError::decode("progress_percent", "arithmetic overflow"))
}

/// `current_price_native * total_supply`.
pub fn market_cap(current_price_native: Decimal, total_supply: Decimal) -> Result<Decimal, ChainError> {
    current_price_native
        .checked_mul(total_supply)
        .map(|m| m.normalize())
        .ok_or_else(|| ChainError::decode("market_cap", "arithmetic overflow"))
}

/// Canonical store key: lowercase `0x`-prefixed hex.
pub fn address_key(address: &Address) -> String {
    format!("{:?}", address)
}
