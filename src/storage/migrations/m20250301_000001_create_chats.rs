use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Chats::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Chats::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Chats::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(Chats::Name).string().not_null())
                    .col(
                        ColumnDef::new(Chats::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_chats_organization")
                    .table(Chats::Table)
                    .col(Chats::OrganizationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ChatDocuments::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ChatDocuments::ChatId).uuid().not_null())
                    .col(ColumnDef::new(ChatDocuments::DocumentId).uuid().not_null())
                    .primary_key(
                        Index::create()
                            .col(ChatDocuments::ChatId)
                            .col(ChatDocuments::DocumentId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_chat_documents_chat")
                            .from(ChatDocuments::Table, ChatDocuments::ChatId)
                            .to(Chats::Table, Chats::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChatDocuments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Chats::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Chats {
    Table,
    Id,
    OrganizationId,
    Name,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ChatDocuments {
    Table,
    ChatId,
    DocumentId,
}
