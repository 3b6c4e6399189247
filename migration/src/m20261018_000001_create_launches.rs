use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Launches::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Launches::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Launches::ContractAddress)
                            .string_len(42)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Launches::TokenAddress).string_len(42).not_null())
                    .col(ColumnDef::new(Launches::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Launches::Symbol).string_len(64).not_null())
                    .col(ColumnDef::new(Launches::CreatorAddress).string_len(42).not_null())
                    .col(
                        ColumnDef::new(Launches::CreatedAtBlockTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Launches::CreatedAtBlock).big_integer().not_null())
                    .col(ColumnDef::new(Launches::CreationTxHash).string_len(66).null())
                    .col(ColumnDef::new(Launches::LogoUrl).text().null())
                    .col(ColumnDef::new(Launches::Description).text().null())
                    .col(ColumnDef::new(Launches::Website).text().null())
                    .col(ColumnDef::new(Launches::Twitter).text().null())
                    .col(ColumnDef::new(Launches::Telegram).text().null())
                    .col(ColumnDef::new(Launches::Discord).text().null())
                    .col(&mut decimal_col(Launches::TotalSupply))
                    .col(&mut decimal_col(Launches::CurrentPriceNative))
                    .col(&mut decimal_col(Launches::TokensSold))
                    .col(&mut decimal_col(Launches::NativeRaised))
                    .col(&mut decimal_col(Launches::LiquidityNative))
                    .col(&mut decimal_col(Launches::BondingCurveProgressPercent))
                    .col(&mut decimal_col(Launches::MarketCapEstimate))
                    .col(
                        ColumnDef::new(Launches::IsGraduated)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Launches::HoldersCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(&mut decimal_col(Launches::Volume24h))
                    .col(&mut decimal_col(Launches::PriceChange24h))
                    .col(
                        ColumnDef::new(Launches::Verified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Launches::Flagged)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Launches::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .to_owned(),
            )
            .await?;

        // Sort keys used by the listing queries
        manager
            .create_index(
                Index::create()
                    .name("idx_launches_created_at")
                    .table(Launches::Table)
                    .col(Launches::CreatedAtBlockTime)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_launches_market_cap")
                    .table(Launches::Table)
                    .col(Launches::MarketCapEstimate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_launches_volume_24h")
                    .table(Launches::Table)
                    .col(Launches::Volume24h)
                    .to_owned(),
            )
            .await?;

        // Active-set selection and the "completed" filter
        manager
            .create_index(
                Index::create()
                    .name("idx_launches_graduated_progress")
                    .table(Launches::Table)
                    .col(Launches::IsGraduated)
                    .col(Launches::BondingCurveProgressPercent)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Launches::Table).to_owned())
            .await
    }
}

/// Token amounts are stored in whole-token units with 18 fractional digits.
fn decimal_col(col: Launches) -> ColumnDef {
    ColumnDef::new(col)
        .decimal_len(38, 18)
        .not_null()
        .default(0)
        .to_owned()
}

#[derive(Iden, Clone, Copy)]
enum Launches {
    Table,
    Id,
    ContractAddress,
    TokenAddress,
    Name,
    Symbol,
    CreatorAddress,
    CreatedAtBlockTime,
    CreatedAtBlock,
    CreationTxHash,
    LogoUrl,
    Description,
    Website,
    Twitter,
    Telegram,
    Discord,
    TotalSupply,
    CurrentPriceNative,
    TokensSold,
    NativeRaised,
    LiquidityNative,
    BondingCurveProgressPercent,
    MarketCapEstimate,
    IsGraduated,
    HoldersCount,
    #[iden = "volume_24h"]
    Volume24h,
    #[iden = "price_change_24h"]
    PriceChange24h,
    Verified,
    Flagged,
    LastSyncedAt,
}
