//! SeaORM Entity for bonding-curve launches
//!
//! One row per launch contract deployed by the factory.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "launches")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Launch contract address (lowercase 0x format, 42 chars)
    #[sea_orm(unique)]
    pub contract_address: String,
    /// Underlying ERC-20 token address
    pub token_address: String,
    pub name: String,
    pub symbol: String,
    pub creator_address: String,
    /// Timestamp of the block holding the LaunchCreated event
    pub created_at_block_time: DateTimeWithTimeZone,
    pub created_at_block: i64,
    pub creation_tx_hash: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub logo_url: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub website: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub twitter: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub telegram: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub discord: Option<String>,
    /// Amounts below are whole tokens / whole native currency
    #[sea_orm(column_type = "Decimal(Some((38, 18)))")]
    pub total_supply: Decimal,
    #[sea_orm(column_type = "Decimal(Some((38, 18)))")]
    pub current_price_native: Decimal,
    #[sea_orm(column_type = "Decimal(Some((38, 18)))")]
    pub tokens_sold: Decimal,
    #[sea_orm(column_type = "Decimal(Some((38, 18)))")]
    pub native_raised: Decimal,
    #[sea_orm(column_type = "Decimal(Some((38, 18)))")]
    pub liquidity_native: Decimal,
    #[sea_orm(column_type = "Decimal(Some((38, 18)))")]
    pub bonding_curve_progress_percent: Decimal,
    #[sea_orm(column_type = "Decimal(Some((38, 18)))")]
    pub market_cap_estimate: Decimal,
    pub is_graduated: bool,
    pub holders_count: i32,
    #[sea_orm(column_type = "Decimal(Some((38, 18)))")]
    pub volume_24h: Decimal,
    #[sea_orm(column_type = "Decimal(Some((38, 18)))")]
    pub price_change_24h: Decimal,
    /// Moderation flags, owned outside the indexer
    pub verified: bool,
    pub flagged: bool,
    pub last_synced_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
