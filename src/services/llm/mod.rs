//! Language-model backends.
//!
//! A backend takes a system prompt, role-tagged messages, optional tool
//! definitions and an output budget, and returns text and/or tool calls.
//! The tool-calling loop itself lives in the orchestrator.

pub mod anthropic;
pub mod openai_compat;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

pub use anthropic::AnthropicBackend;
pub use openai_compat::{ApiAuth, OpenAiCompatibleBackend};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Model returned an empty response")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelMessage {
    User(String),
    Assistant(String),
    /// An assistant turn that requested tools, optionally with some text.
    ToolCalls {
        text: Option<String>,
        calls: Vec<ToolCall>,
    },
    ToolResult {
        call_id: String,
        content: String,
    },
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
}

impl ModelRequest {
    /// A single-prompt request without tools.
    pub fn prompt(system: impl Into<String>, user: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: system.into(),
            messages: vec![ModelMessage::User(user.into())],
            tools: Vec::new(),
            max_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider/model label used in logs.
    fn name(&self) -> String;

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, LlmError>;

    /// Like `complete`, forwarding text fragments to `deltas` as they arrive.
    /// A closed receiver does not abort the call.
    async fn complete_streaming(
        &self,
        request: &ModelRequest,
        deltas: mpsc::Sender<String>,
    ) -> Result<ModelResponse, LlmError> {
        let response = self.complete(request).await?;
        if !response.text.is_empty() {
            let _ = deltas.send(response.text.clone()).await;
        }
        Ok(response)
    }
}

/// Collapses a non-success HTTP response into `LlmError::Api`.
pub(crate) async fn api_error(response: reqwest::Response) -> LlmError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    LlmError::Api { status, message }
}
