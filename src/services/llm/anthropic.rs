//! Anthropic Messages API backend.
//!
//! Authenticates with `x-api-key` and the `anthropic-version` header. The
//! system prompt is a top-level field; consecutive turns of the same role
//! are merged because the API requires strict user/assistant alternation.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    api_error, LanguageModel, LlmError, ModelMessage, ModelRequest, ModelResponse, TokenUsage,
    ToolCall, ToolDefinition,
};

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicBackend {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(ANTHROPIC_BASE_URL.to_string(), api_key, model)
    }

    pub fn with_base_url(base_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    fn build_request_body(&self, request: &ModelRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": Self::messages_to_json(&request.messages),
        });

        if !request.system.is_empty() {
            body["system"] = Value::String(request.system.clone());
        }
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.iter().map(Self::tool_to_json).collect());
        }

        body
    }

    fn messages_to_json(messages: &[ModelMessage]) -> Vec<Value> {
        let mut turns: Vec<(&'static str, Vec<Value>)> = Vec::new();

        for message in messages {
            let (role, blocks) = match message {
                ModelMessage::User(text) => ("user", vec![json!({ "type": "text", "text": text })]),
                ModelMessage::Assistant(text) => {
                    ("assistant", vec![json!({ "type": "text", "text": text })])
                }
                ModelMessage::ToolCalls { text, calls } => {
                    let mut blocks = Vec::with_capacity(calls.len() + 1);
                    if let Some(text) = text.as_deref().filter(|t| !t.is_empty()) {
                        blocks.push(json!({ "type": "text", "text": text }));
                    }
                    blocks.extend(calls.iter().map(|call| {
                        json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": call.arguments,
                        })
                    }));
                    ("assistant", blocks)
                }
                ModelMessage::ToolResult { call_id, content } => (
                    "user",
                    vec![json!({
                        "type": "tool_result",
                        "tool_use_id": call_id,
                        "content": content,
                    })],
                ),
            };

            match turns.last_mut() {
                Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
                _ => turns.push((role, blocks)),
            }
        }

        turns
            .into_iter()
            .map(|(role, content)| json!({ "role": role, "content": content }))
            .collect()
    }

    fn tool_to_json(tool: &ToolDefinition) -> Value {
        json!({
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.parameters,
        })
    }

    fn parse_response(body: &Value) -> Result<ModelResponse, LlmError> {
        let blocks = body["content"]
            .as_array()
            .ok_or_else(|| LlmError::InvalidResponse("missing 'content' array".to_string()))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in blocks {
            match block["type"].as_str() {
                Some("text") => text.push_str(block["text"].as_str().unwrap_or_default()),
                Some("tool_use") => tool_calls.push(ToolCall {
                    id: block["id"].as_str().unwrap_or_default().to_string(),
                    name: block["name"].as_str().unwrap_or_default().to_string(),
                    arguments: block["input"].clone(),
                }),
                other => debug!(block_type = ?other, "Ignoring content block"),
            }
        }

        Ok(ModelResponse {
            text,
            tool_calls,
            usage: TokenUsage {
                input_tokens: body["usage"]["input_tokens"].as_u64().unwrap_or(0),
                output_tokens: body["usage"]["output_tokens"].as_u64().unwrap_or(0),
            },
        })
    }
}

#[async_trait]
impl LanguageModel for AnthropicBackend {
    fn name(&self) -> String {
        format!("anthropic/{}", self.model)
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, LlmError> {
        let url = format!("{}/messages", self.base_url);
        debug!(model = %self.model, tools = request.tools.len(), "Sending Anthropic request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.build_request_body(request))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: Value = response.json().await?;
        Self::parse_response(&body)
    }
}
