use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::internal::{Message, Role};
use crate::orchestrator::prompts::{summary_prompt, SUMMARY_SYSTEM_PROMPT};
use crate::orchestrator::windowing::{older_prefix, WindowPolicy};
use crate::services::llm::{LanguageModel, LlmError, ModelRequest};
use crate::storage::repository::{ChatRepository, RepositoryError};

const SUMMARY_MAX_WORDS: usize = 200;
const SUMMARY_MAX_TOKENS: u32 = 512;

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Summary model error: {0}")]
    Model(#[from] LlmError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    SessionNotFound,
    /// Not enough history to be worth summarizing.
    TooShort,
    /// Everything still fits in the window.
    NothingOutsideWindow,
    /// The watermark already points at the end of the older prefix.
    UpToDate,
    Updated { watermark: Uuid },
}

/// Rolling summary of the messages that have left the window.
pub struct SummaryCache {
    repo: Arc<dyn ChatRepository>,
    min_messages: usize,
}

impl SummaryCache {
    pub fn new(repo: Arc<dyn ChatRepository>, min_messages: usize) -> Self {
        Self { repo, min_messages }
    }

    /// Brings the stored summary up to the current window boundary.
    ///
    /// Summary and watermark are written together, and only after the model
    /// succeeded; on error the previous pair stays in place.
    pub async fn maybe_summarize(
        &self,
        session_id: Uuid,
        policy: WindowPolicy,
        model: &dyn LanguageModel,
    ) -> Result<SummaryOutcome, SummaryError> {
        let Some(session) = self.repo.find_session(session_id).await? else {
            return Ok(SummaryOutcome::SessionNotFound);
        };

        let messages = self.repo.session_messages(session_id).await?;
        if messages.len() <= self.min_messages {
            return Ok(SummaryOutcome::TooShort);
        }

        let prefix = older_prefix(&messages, policy);
        let Some(last) = prefix.last() else {
            return Ok(SummaryOutcome::NothingOutsideWindow);
        };
        if session.summary_watermark == Some(last.id) {
            debug!(session_id = %session_id, "Summary already covers the older prefix");
            return Ok(SummaryOutcome::UpToDate);
        }

        let request = ModelRequest::prompt(
            SUMMARY_SYSTEM_PROMPT,
            summary_prompt(&render_transcript(prefix), SUMMARY_MAX_WORDS),
            SUMMARY_MAX_TOKENS,
        );
        let response = model.complete(&request).await?;
        let summary = response.text.trim();
        if summary.is_empty() {
            return Err(SummaryError::Model(LlmError::EmptyResponse));
        }

        self.repo
            .update_session_summary(session_id, summary, last.id)
            .await?;

        info!(
            session_id = %session_id,
            summarized = prefix.len(),
            model = %model.name(),
            "Updated session summary"
        );
        Ok(SummaryOutcome::Updated { watermark: last.id })
    }
}

/// `User: ...` / `Assistant: ...` lines, one per message.
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let speaker = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
