use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TokenLimits::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(TokenLimits::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(TokenLimits::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(TokenLimits::MemberId).uuid().not_null())
                    .col(ColumnDef::new(TokenLimits::Interval).string_len(8).not_null())
                    .col(ColumnDef::new(TokenLimits::LimitTokens).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_token_limits_member")
                    .table(TokenLimits::Table)
                    .col(TokenLimits::OrganizationId)
                    .col(TokenLimits::MemberId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TokenLimits::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TokenLimits {
    Table,
    Id,
    OrganizationId,
    MemberId,
    Interval,
    LimitTokens,
}
