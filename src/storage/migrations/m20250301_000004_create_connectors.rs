use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Connectors::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Connectors::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Connectors::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(Connectors::Provider).string_len(32).not_null())
                    .col(ColumnDef::new(Connectors::Model).string().null())
                    .col(ColumnDef::new(Connectors::ApiKey).string().null())
                    .col(ColumnDef::new(Connectors::Endpoint).string().null())
                    .col(ColumnDef::new(Connectors::ApiVersion).string().null())
                    .col(
                        ColumnDef::new(Connectors::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ChatConnectors::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ChatConnectors::ChatId).uuid().not_null())
                    .col(ColumnDef::new(ChatConnectors::ConnectorId).uuid().not_null())
                    .col(
                        ColumnDef::new(ChatConnectors::Position)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .primary_key(
                        Index::create()
                            .col(ChatConnectors::ChatId)
                            .col(ChatConnectors::ConnectorId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_chat_connectors_chat")
                            .from(ChatConnectors::Table, ChatConnectors::ChatId)
                            .to(Chats::Table, Chats::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_chat_connectors_connector")
                            .from(ChatConnectors::Table, ChatConnectors::ConnectorId)
                            .to(Connectors::Table, Connectors::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChatConnectors::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Connectors::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Connectors {
    Table,
    Id,
    OrganizationId,
    Provider,
    Model,
    ApiKey,
    Endpoint,
    ApiVersion,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ChatConnectors {
    Table,
    ChatId,
    ConnectorId,
    Position,
}

#[derive(DeriveIden)]
enum Chats {
    Table,
    Id,
}
