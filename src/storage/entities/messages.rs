use crate::models::internal::Role;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "messages")]
pub struct Model {
    /// Insertion order; breaks ties between equal timestamps.
    #[sea_orm(primary_key)]
    pub seq: i32,
    #[sea_orm(unique)]
    pub id: Uuid,
    pub session_id: Uuid,
    pub chat_id: Uuid,
    pub member_id: Uuid,
    pub role: Role,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub token_count: Option<i32>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
