use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Author of a stored message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[sea_orm(string_value = "user")]
    User,
    #[sea_orm(string_value = "assistant")]
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub chat_id: Uuid,
    pub member_id: Uuid,
    pub role: Role,
    pub content: String,
    /// Estimated at write time; older rows may not carry it.
    pub token_count: Option<i32>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: Uuid,
    pub chat_id: Uuid,
    pub member_id: Uuid,
    pub role: Role,
    pub content: String,
    pub token_count: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub member_id: Uuid,
    pub title: Option<String>,
    pub summary: Option<String>,
    /// Id of the last message folded into `summary`.
    pub summary_watermark: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Chat {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Supported model providers. Order of declaration is not the routing
/// priority; see `ProviderKind::priority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    AzureOpenAi,
    Copilot,
    Mistral,
    Custom,
}

impl ProviderKind {
    /// Lower ranks win. Everything after copilot keeps configuration order.
    pub fn priority(&self) -> u8 {
        match self {
            ProviderKind::Anthropic => 0,
            ProviderKind::OpenAi => 1,
            ProviderKind::AzureOpenAi => 2,
            ProviderKind::Copilot => 3,
            ProviderKind::Mistral | ProviderKind::Custom => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAi => "openai",
            ProviderKind::AzureOpenAi => "azure_openai",
            ProviderKind::Copilot => "copilot",
            ProviderKind::Mistral => "mistral",
            ProviderKind::Custom => "custom",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(ProviderKind::Anthropic),
            "openai" => Ok(ProviderKind::OpenAi),
            "azure_openai" | "azure-openai" | "azure" => Ok(ProviderKind::AzureOpenAi),
            "copilot" => Ok(ProviderKind::Copilot),
            "mistral" => Ok(ProviderKind::Mistral),
            "custom" => Ok(ProviderKind::Custom),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// A chat's binding to a model provider.
#[derive(Debug, Clone)]
pub struct Connector {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub provider: ProviderKind,
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// Azure resource endpoint or custom base URL.
    pub endpoint: Option<String>,
    pub api_version: Option<String>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum TokenInterval {
    #[sea_orm(string_value = "day")]
    Day,
    #[sea_orm(string_value = "week")]
    Week,
    #[sea_orm(string_value = "month")]
    Month,
}

impl fmt::Display for TokenInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TokenInterval::Day => "day",
            TokenInterval::Week => "week",
            TokenInterval::Month => "month",
        })
    }
}

#[derive(Debug, Clone)]
pub struct TokenLimit {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub member_id: Uuid,
    pub interval: TokenInterval,
    pub limit_tokens: i64,
}

/// A retrieved slice of an ingested document.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChunk {
    pub document_id: Uuid,
    pub chunk_id: String,
    pub chunk_index: Option<i64>,
    pub content: String,
    pub token_count: Option<i64>,
    /// Lower is more similar.
    pub distance: f32,
}
