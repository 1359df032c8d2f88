use tracing::debug;

use crate::orchestrator::prompts::{title_prompt, TITLE_SYSTEM_PROMPT};
use crate::services::llm::{LanguageModel, LlmError, ModelRequest};

const TITLE_MAX_TOKENS: u32 = 32;

/// True when the session still has no meaningful title.
pub fn needs_title(title: Option<&str>, chat_name: &str) -> bool {
    match title.map(str::trim) {
        None | Some("") => true,
        Some(title) => title == chat_name.trim(),
    }
}

/// Strips wrapping quotes, collapses whitespace and caps the length.
/// Returns `None` when nothing usable is left.
pub fn sanitize_title(raw: &str, max_chars: usize) -> Option<String> {
    let first_line = raw.trim().lines().next().unwrap_or_default();
    let unquoted = first_line
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '`' | '“' | '”' | '‘' | '’' | '«' | '»'))
        .trim();
    let collapsed = unquoted.split_whitespace().collect::<Vec<_>>().join(" ");

    let title: String = collapsed.chars().take(max_chars).collect();
    let title = title.trim_end().to_string();
    (!title.is_empty()).then_some(title)
}

pub async fn generate_title(
    model: &dyn LanguageModel,
    user_text: &str,
    assistant_text: &str,
    max_chars: usize,
) -> Result<Option<String>, LlmError> {
    let request = ModelRequest::prompt(
        TITLE_SYSTEM_PROMPT,
        title_prompt(user_text, assistant_text, max_chars),
        TITLE_MAX_TOKENS,
    );
    let response = model.complete(&request).await?;
    let title = sanitize_title(&response.text, max_chars);
    debug!(title = ?title, "Generated session title");
    Ok(title)
}
