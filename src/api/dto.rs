use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::internal::Role;
use crate::orchestrator::QuotaItem;

// ==================== REQUEST DTOs ====================

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct MessageDto {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnRequest {
    pub session_id: Option<String>,
    /// The new user message. When absent, the last `user` entry of
    /// `messages` is used.
    pub content: Option<String>,
    #[serde(default)]
    pub messages: Vec<MessageDto>,
    pub locale: Option<String>,
}

impl ChatTurnRequest {
    pub fn user_content(&self) -> Option<&str> {
        self.content
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .or_else(|| {
                self.messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
            })
    }
}

// ==================== RESPONSE DTOs ====================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnResponse {
    pub session_id: Uuid,
    pub user_message_id: Uuid,
    pub assistant_message_id: Uuid,
    pub content: String,
    pub model_invoked: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuotaResponse {
    pub blocked: bool,
    pub items: Vec<QuotaItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Error body shared by every endpoint. `code` is a stable machine-readable
/// identifier such as `sessionNotFound` or `tokenLimit`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: &str) -> Self {
        Self {
            error: error.into(),
            code: code.to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
