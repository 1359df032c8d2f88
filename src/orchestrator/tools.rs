//! The document-search tool offered to the model.

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::internal::DocumentChunk;
use crate::services::llm::{ToolCall, ToolDefinition};
use crate::services::retrieval::DocumentSearch;

pub const SEARCH_TOOL_NAME: &str = "search_documents";

const SEARCH_TOOL_DESCRIPTION: &str = "Search the documents attached to this chat and return \
the most relevant passages. Only use this for factual questions about the content of those \
documents. Do not use it for greetings, small talk, or questions you can answer from general \
knowledge.";

#[derive(Debug, Deserialize)]
struct SearchArguments {
    query: String,
}

pub fn search_tool() -> ToolDefinition {
    ToolDefinition {
        name: SEARCH_TOOL_NAME.to_string(),
        description: SEARCH_TOOL_DESCRIPTION.to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look for, phrased as a search query"
                }
            },
            "required": ["query"]
        }),
    }
}

/// Runs a tool call and renders its output for the model. Problems are
/// reported back to the model as text rather than failing the turn.
pub async fn execute(
    call: &ToolCall,
    search: &dyn DocumentSearch,
    limit: usize,
    document_ids: &[Uuid],
) -> String {
    if call.name != SEARCH_TOOL_NAME {
        warn!(tool = %call.name, "Model requested an unknown tool");
        return format!("Unknown tool: {}", call.name);
    }

    let args: SearchArguments = match serde_json::from_value(call.arguments.clone()) {
        Ok(args) => args,
        Err(e) => return format!("Invalid arguments for {}: {}", SEARCH_TOOL_NAME, e),
    };

    let chunks = search.search(&args.query, limit, Some(document_ids)).await;
    debug!(query = %args.query, results = chunks.len(), "Executed document search");
    format_results(&chunks)
}

pub fn format_results(chunks: &[DocumentChunk]) -> String {
    if chunks.is_empty() {
        return "No relevant passages were found in the attached documents.".to_string();
    }

    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[{}] document {} (distance {:.3}):\n{}",
                i + 1,
                chunk.document_id,
                chunk.distance,
                chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
