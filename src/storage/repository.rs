use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{prelude::*, ActiveValue::NotSet, QueryOrder, QuerySelect, Set};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::internal::{
    Chat, Connector, Message, NewMessage, ProviderKind, Session, TokenInterval, TokenLimit,
};
use crate::storage::entities::{
    chat_connectors, chat_documents, chats, connectors, messages, sessions, token_limits,
};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DbError(#[from] sea_orm::DbErr),
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

// ============================================
// TRAIT DEFINITION
// ============================================
#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, RepositoryError>;
    async fn find_chat(&self, id: Uuid) -> Result<Option<Chat>, RepositoryError>;

    async fn chat_document_ids(&self, chat_id: Uuid) -> Result<Vec<Uuid>, RepositoryError>;

    /// Connectors attached to a chat, in configuration order.
    async fn chat_connectors(&self, chat_id: Uuid) -> Result<Vec<Connector>, RepositoryError>;

    /// Full history, oldest first.
    async fn session_messages(&self, session_id: Uuid) -> Result<Vec<Message>, RepositoryError>;

    /// The newest `limit` messages, returned oldest first.
    async fn recent_session_messages(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError>;

    async fn insert_message(&self, message: NewMessage) -> Result<Message, RepositoryError>;

    async fn update_session_title(&self, session_id: Uuid, title: &str)
        -> Result<(), RepositoryError>;

    /// Overwrites summary and watermark together.
    async fn update_session_summary(
        &self,
        session_id: Uuid,
        summary: &str,
        watermark: Uuid,
    ) -> Result<(), RepositoryError>;

    async fn token_limits(
        &self,
        organization_id: Uuid,
        member_id: Uuid,
    ) -> Result<Vec<TokenLimit>, RepositoryError>;

    /// Sum of recorded token counts for the member's messages at or after `since`.
    async fn sum_member_tokens_since(
        &self,
        member_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, RepositoryError>;
}

// ============================================
// IMPLEMENTATION STRUCT
// ============================================
pub struct SeaOrmChatRepository {
    db: DatabaseConnection,
}

impl SeaOrmChatRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

// ============================================
// TRAIT IMPLEMENTATION
// ============================================
#[async_trait]
impl ChatRepository for SeaOrmChatRepository {
    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, RepositoryError> {
        let model = sessions::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Session::from))
    }

    async fn find_chat(&self, id: Uuid) -> Result<Option<Chat>, RepositoryError> {
        let model = chats::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Chat::from))
    }

    async fn chat_document_ids(&self, chat_id: Uuid) -> Result<Vec<Uuid>, RepositoryError> {
        let ids = chat_documents::Entity::find()
            .select_only()
            .column(chat_documents::Column::DocumentId)
            .filter(chat_documents::Column::ChatId.eq(chat_id))
            .into_tuple::<Uuid>()
            .all(&self.db)
            .await?;

        Ok(ids)
    }

    async fn chat_connectors(&self, chat_id: Uuid) -> Result<Vec<Connector>, RepositoryError> {
        let links = chat_connectors::Entity::find()
            .filter(chat_connectors::Column::ChatId.eq(chat_id))
            .order_by_asc(chat_connectors::Column::Position)
            .all(&self.db)
            .await?;

        if links.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_id: HashMap<Uuid, connectors::Model> = connectors::Entity::find()
            .filter(connectors::Column::Id.is_in(links.iter().map(|l| l.connector_id)))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        let mut result = Vec::with_capacity(links.len());
        for link in links {
            let Some(model) = by_id.remove(&link.connector_id) else {
                continue;
            };
            match model.provider.parse::<ProviderKind>() {
                Ok(provider) => result.push(Connector {
                    id: model.id,
                    organization_id: model.organization_id,
                    provider,
                    model: model.model,
                    api_key: model.api_key,
                    endpoint: model.endpoint,
                    api_version: model.api_version,
                }),
                Err(e) => tracing::warn!(connector_id = %model.id, "Skipping connector: {}", e),
            }
        }

        Ok(result)
    }

    async fn session_messages(&self, session_id: Uuid) -> Result<Vec<Message>, RepositoryError> {
        let models = messages::Entity::find()
            .filter(messages::Column::SessionId.eq(session_id))
            .order_by_asc(messages::Column::CreatedAt)
            .order_by_asc(messages::Column::Seq)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Message::from).collect())
    }

    async fn recent_session_messages(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError> {
        let models = messages::Entity::find()
            .filter(messages::Column::SessionId.eq(session_id))
            .order_by_desc(messages::Column::CreatedAt)
            .order_by_desc(messages::Column::Seq)
            .limit(limit as u64)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().rev().map(Message::from).collect())
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        self.insert_message_at(message, Utc::now()).await
    }

    async fn update_session_title(
        &self,
        session_id: Uuid,
        title: &str,
    ) -> Result<(), RepositoryError> {
        let result = sessions::Entity::update_many()
            .col_expr(sessions::Column::Title, Expr::value(title.to_string()))
            .filter(sessions::Column::Id.eq(session_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound(format!("Session {}", session_id)));
        }
        Ok(())
    }

    async fn update_session_summary(
        &self,
        session_id: Uuid,
        summary: &str,
        watermark: Uuid,
    ) -> Result<(), RepositoryError> {
        let result = sessions::Entity::update_many()
            .col_expr(sessions::Column::Summary, Expr::value(summary.to_string()))
            .col_expr(sessions::Column::SummaryWatermark, Expr::value(watermark))
            .filter(sessions::Column::Id.eq(session_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound(format!("Session {}", session_id)));
        }
        Ok(())
    }

    async fn token_limits(
        &self,
        organization_id: Uuid,
        member_id: Uuid,
    ) -> Result<Vec<TokenLimit>, RepositoryError> {
        let models = token_limits::Entity::find()
            .filter(token_limits::Column::OrganizationId.eq(organization_id))
            .filter(token_limits::Column::MemberId.eq(member_id))
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(TokenLimit::from).collect())
    }

    async fn sum_member_tokens_since(
        &self,
        member_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        let total = messages::Entity::find()
            .select_only()
            .column_as(Expr::col(messages::Column::TokenCount).sum(), "total")
            .filter(messages::Column::MemberId.eq(member_id))
            .filter(messages::Column::CreatedAt.gte(since))
            .into_tuple::<Option<i64>>()
            .one(&self.db)
            .await?;

        Ok(total.flatten().unwrap_or(0))
    }
}

// ============================================
// Seeding helpers (tests and bootstrap)
// ============================================
impl SeaOrmChatRepository {
    /// Inserts a message with an explicit creation time.
    pub async fn insert_message_at(
        &self,
        message: NewMessage,
        created_at: DateTime<Utc>,
    ) -> Result<Message, RepositoryError> {
        if message.content.is_empty() {
            return Err(RepositoryError::InvalidInput(
                "Message content must not be empty".to_string(),
            ));
        }

        let model = messages::ActiveModel {
            seq: NotSet,
            id: Set(Uuid::new_v4()),
            session_id: Set(message.session_id),
            chat_id: Set(message.chat_id),
            member_id: Set(message.member_id),
            role: Set(message.role),
            content: Set(message.content),
            token_count: Set(message.token_count),
            created_at: Set(created_at),
        }
        .insert(&self.db)
        .await?;

        tracing::debug!(
            message_id = %model.id,
            session_id = %model.session_id,
            role = model.role.as_str(),
            "Stored message"
        );

        Ok(Message::from(model))
    }

    pub async fn create_chat(
        &self,
        organization_id: Uuid,
        name: &str,
    ) -> Result<Chat, RepositoryError> {
        let model = chats::ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(organization_id),
            name: Set(name.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await?;

        Ok(Chat::from(model))
    }

    pub async fn create_session(
        &self,
        chat_id: Uuid,
        member_id: Uuid,
        title: Option<&str>,
    ) -> Result<Session, RepositoryError> {
        let model = sessions::ActiveModel {
            id: Set(Uuid::new_v4()),
            chat_id: Set(chat_id),
            member_id: Set(member_id),
            title: Set(title.map(str::to_string)),
            summary: Set(None),
            summary_watermark: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await?;

        Ok(Session::from(model))
    }

    pub async fn attach_document(
        &self,
        chat_id: Uuid,
        document_id: Uuid,
    ) -> Result<(), RepositoryError> {
        chat_documents::ActiveModel {
            chat_id: Set(chat_id),
            document_id: Set(document_id),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    pub async fn create_connector(
        &self,
        organization_id: Uuid,
        provider: ProviderKind,
        model: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<Uuid, RepositoryError> {
        let id = Uuid::new_v4();
        connectors::ActiveModel {
            id: Set(id),
            organization_id: Set(organization_id),
            provider: Set(provider.as_str().to_string()),
            model: Set(model.map(str::to_string)),
            api_key: Set(api_key.map(str::to_string)),
            endpoint: Set(None),
            api_version: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await?;
        Ok(id)
    }

    pub async fn attach_connector(
        &self,
        chat_id: Uuid,
        connector_id: Uuid,
        position: i32,
    ) -> Result<(), RepositoryError> {
        chat_connectors::ActiveModel {
            chat_id: Set(chat_id),
            connector_id: Set(connector_id),
            position: Set(position),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    pub async fn create_token_limit(
        &self,
        organization_id: Uuid,
        member_id: Uuid,
        interval: TokenInterval,
        limit_tokens: i64,
    ) -> Result<Uuid, RepositoryError> {
        if limit_tokens < 0 {
            return Err(RepositoryError::InvalidInput(
                "Token limit must not be negative".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        token_limits::ActiveModel {
            id: Set(id),
            organization_id: Set(organization_id),
            member_id: Set(member_id),
            interval: Set(interval),
            limit_tokens: Set(limit_tokens),
        }
        .insert(&self.db)
        .await?;
        Ok(id)
    }
}

// ============================================
// Conversions
// ============================================

impl From<sessions::Model> for Session {
    fn from(model: sessions::Model) -> Self {
        Self {
            id: model.id,
            chat_id: model.chat_id,
            member_id: model.member_id,
            title: model.title,
            summary: model.summary,
            summary_watermark: model.summary_watermark,
            created_at: model.created_at,
        }
    }
}

impl From<chats::Model> for Chat {
    fn from(model: chats::Model) -> Self {
        Self {
            id: model.id,
            organization_id: model.organization_id,
            name: model.name,
            created_at: model.created_at,
        }
    }
}

impl From<messages::Model> for Message {
    fn from(model: messages::Model) -> Self {
        Self {
            id: model.id,
            session_id: model.session_id,
            chat_id: model.chat_id,
            member_id: model.member_id,
            role: model.role,
            content: model.content,
            token_count: model.token_count,
            created_at: model.created_at,
        }
    }
}

impl From<token_limits::Model> for TokenLimit {
    fn from(model: token_limits::Model) -> Self {
        Self {
            id: model.id,
            organization_id: model.organization_id,
            member_id: model.member_id,
            interval: model.interval,
            limit_tokens: model.limit_tokens,
        }
    }
}
