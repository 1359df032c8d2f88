use crate::models::internal::{Message, Role, Session};
use crate::orchestrator::prompts::{SUMMARY_ACKNOWLEDGEMENT, SUMMARY_PREAMBLE};
use crate::orchestrator::windowing::{select_window, WindowPolicy};
use crate::services::llm::ModelMessage;
use crate::storage::repository::{ChatRepository, RepositoryError};

/// Model-visible history for one turn, before the new user message.
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    pub history: Vec<ModelMessage>,
    pub windowed_messages: usize,
    pub has_older: bool,
    pub summary_included: bool,
}

/// Loads the window for `session` and prepends its stored summary when part
/// of the history has fallen out of the window.
pub async fn build_context(
    repo: &dyn ChatRepository,
    session: &Session,
    policy: WindowPolicy,
) -> Result<TurnContext, RepositoryError> {
    // One extra row tells us whether the message cap cut anything off.
    let recent = repo
        .recent_session_messages(session.id, policy.max_messages.max(1) + 1)
        .await?;
    let window = select_window(&recent, policy);

    let summary = session
        .summary
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && window.has_older);

    let mut history = Vec::with_capacity(window.windowed.len() + 2);
    if let Some(summary) = summary {
        history.push(ModelMessage::User(format!("{} {}", SUMMARY_PREAMBLE, summary)));
        history.push(ModelMessage::Assistant(SUMMARY_ACKNOWLEDGEMENT.to_string()));
    }
    history.extend(window.windowed.iter().map(to_model_message));

    tracing::debug!(
        session_id = %session.id,
        windowed = window.windowed.len(),
        has_older = window.has_older,
        summary = summary.is_some(),
        "Built turn context"
    );

    Ok(TurnContext {
        history,
        windowed_messages: window.windowed.len(),
        has_older: window.has_older,
        summary_included: summary.is_some(),
    })
}

pub fn to_model_message(message: &Message) -> ModelMessage {
    match message.role {
        Role::User => ModelMessage::User(message.content.clone()),
        Role::Assistant => ModelMessage::Assistant(message.content.clone()),
    }
}
