//! OpenAI-compatible chat completions backend.
//!
//! One implementation serves OpenAI, Azure OpenAI, GitHub Copilot, Mistral
//! and custom gateways; they differ only in URL and authentication header.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{
    api_error, LanguageModel, LlmError, ModelMessage, ModelRequest, ModelResponse, TokenUsage,
    ToolCall, ToolDefinition,
};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const COPILOT_BASE_URL: &str = "https://api.githubcopilot.com";
pub const MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";

#[derive(Debug, Clone)]
pub enum ApiAuth {
    /// `Authorization: Bearer <key>`
    Bearer(String),
    /// Azure style `api-key: <key>`
    ApiKeyHeader(String),
}

pub struct OpenAiCompatibleBackend {
    client: reqwest::Client,
    label: &'static str,
    url: String,
    auth: ApiAuth,
    model: String,
    extra_headers: Vec<(&'static str, String)>,
}

impl OpenAiCompatibleBackend {
    /// `base_url` is the API root; `/chat/completions` is appended.
    pub fn new(label: &'static str, base_url: &str, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            label,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            auth: ApiAuth::Bearer(api_key),
            model,
            extra_headers: Vec::new(),
        }
    }

    pub fn azure(endpoint: &str, api_version: &str, api_key: String, deployment: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            label: "azure_openai",
            url: format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                api_version
            ),
            auth: ApiAuth::ApiKeyHeader(api_key),
            model: deployment,
            extra_headers: Vec::new(),
        }
    }

    pub fn copilot(base_url: &str, api_key: String, model: String) -> Self {
        let mut backend = Self::new("copilot", base_url, api_key, model);
        backend
            .extra_headers
            .push(("Copilot-Integration-Id", "vscode-chat".to_string()));
        backend
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request_builder(&self) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(&self.url);
        builder = match &self.auth {
            ApiAuth::Bearer(key) => builder.bearer_auth(key),
            ApiAuth::ApiKeyHeader(key) => builder.header("api-key", key),
        };
        for (name, value) in &self.extra_headers {
            builder = builder.header(*name, value);
        }
        builder
    }

    fn build_request_body(&self, request: &ModelRequest, stream: bool) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(json!({ "role": "system", "content": request.system }));
        }
        messages.extend(request.messages.iter().map(Self::message_to_json));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = json!({ "include_usage": true });
        }
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.iter().map(Self::tool_to_json).collect());
        }

        body
    }

    fn message_to_json(message: &ModelMessage) -> Value {
        match message {
            ModelMessage::User(text) => json!({ "role": "user", "content": text }),
            ModelMessage::Assistant(text) => json!({ "role": "assistant", "content": text }),
            ModelMessage::ToolCalls { text, calls } => json!({
                "role": "assistant",
                "content": text,
                "tool_calls": calls.iter().map(|call| json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.arguments.to_string(),
                    }
                })).collect::<Vec<_>>(),
            }),
            ModelMessage::ToolResult { call_id, content } => json!({
                "role": "tool",
                "tool_call_id": call_id,
                "content": content,
            }),
        }
    }

    fn tool_to_json(tool: &ToolDefinition) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        })
    }

    fn parse_arguments(raw: &str) -> Value {
        if raw.trim().is_empty() {
            return json!({});
        }
        serde_json::from_str(raw).unwrap_or_else(|e| {
            warn!("Tool call arguments are not valid JSON: {}", e);
            json!({})
        })
    }

    fn parse_usage(usage: &Value) -> TokenUsage {
        TokenUsage {
            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
        }
    }

    fn parse_response(body: &Value) -> Result<ModelResponse, LlmError> {
        let message = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

        let tool_calls = message["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|tc| {
                        Some(ToolCall {
                            id: tc["id"].as_str()?.to_string(),
                            name: tc["function"]["name"].as_str()?.to_string(),
                            arguments: Self::parse_arguments(
                                tc["function"]["arguments"].as_str().unwrap_or_default(),
                            ),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ModelResponse {
            text: message["content"].as_str().unwrap_or_default().to_string(),
            tool_calls,
            usage: Self::parse_usage(&body["usage"]),
        })
    }

    /// Payload of one SSE `data:` line, `None` for `[DONE]` and non-data lines.
    fn parse_sse_line(line: &str) -> Option<Value> {
        let data = line.strip_prefix("data:")?.trim();
        if data == "[DONE]" {
            return None;
        }
        serde_json::from_str(data).ok()
    }
}

/// Accumulates streamed chunks into a final response.
#[derive(Default)]
struct StreamState {
    text: String,
    usage: TokenUsage,
    // index -> (id, name, arguments so far)
    tool_calls: BTreeMap<u64, (String, String, String)>,
}

impl StreamState {
    /// Applies one chunk; returns the text fragment it carried, if any.
    fn apply(&mut self, chunk: &Value) -> Option<String> {
        if chunk["usage"].is_object() {
            self.usage = OpenAiCompatibleBackend::parse_usage(&chunk["usage"]);
        }

        let delta = &chunk["choices"][0]["delta"];

        if let Some(calls) = delta["tool_calls"].as_array() {
            for call in calls {
                let index = call["index"].as_u64().unwrap_or(0);
                let entry = self.tool_calls.entry(index).or_default();
                if let Some(id) = call["id"].as_str() {
                    entry.0 = id.to_string();
                }
                if let Some(name) = call["function"]["name"].as_str() {
                    entry.1.push_str(name);
                }
                if let Some(arguments) = call["function"]["arguments"].as_str() {
                    entry.2.push_str(arguments);
                }
            }
        }

        match delta["content"].as_str() {
            Some(content) if !content.is_empty() => {
                self.text.push_str(content);
                Some(content.to_string())
            }
            _ => None,
        }
    }

    fn finish(self) -> ModelResponse {
        ModelResponse {
            text: self.text,
            tool_calls: self
                .tool_calls
                .into_values()
                .map(|(id, name, arguments)| ToolCall {
                    id,
                    name,
                    arguments: OpenAiCompatibleBackend::parse_arguments(&arguments),
                })
                .collect(),
            usage: self.usage,
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleBackend {
    fn name(&self) -> String {
        format!("{}/{}", self.label, self.model)
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, LlmError> {
        debug!(url = %self.url, model = %self.model, "Sending chat completion request");

        let response = self
            .request_builder()
            .json(&self.build_request_body(request, false))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body: Value = response.json().await?;
        Self::parse_response(&body)
    }

    async fn complete_streaming(
        &self,
        request: &ModelRequest,
        deltas: mpsc::Sender<String>,
    ) -> Result<ModelResponse, LlmError> {
        debug!(url = %self.url, model = %self.model, "Sending streaming chat completion request");

        let response = self
            .request_builder()
            .json(&self.build_request_body(request, true))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let mut state = StreamState::default();
        let mut buffer: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();

        'read: while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line_bytes: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line_bytes);
                let line = line.trim();

                if line == "data: [DONE]" || line == "data:[DONE]" {
                    break 'read;
                }
                if let Some(value) = Self::parse_sse_line(line) {
                    if let Some(fragment) = state.apply(&value) {
                        let _ = deltas.send(fragment).await;
                    }
                }
            }
        }

        Ok(state.finish())
    }
}
