use sea_orm_migration::prelude::*;

mod m20250301_000001_create_chats;
mod m20250301_000002_create_sessions;
mod m20250301_000003_create_messages;
mod m20250301_000004_create_connectors;
mod m20250301_000005_create_token_limits;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_chats::Migration),
            Box::new(m20250301_000002_create_sessions::Migration),
            Box::new(m20250301_000003_create_messages::Migration),
            Box::new(m20250301_000004_create_connectors::Migration),
            Box::new(m20250301_000005_create_token_limits::Migration),
        ]
    }
}
