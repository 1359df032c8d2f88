//! Most-recent-first selection of conversation history under a token budget.

use serde::{Deserialize, Serialize};

use crate::models::internal::Message;
use crate::services::token_estimator::estimate_tokens;

/// Limits applied when selecting the model-visible history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPolicy {
    pub max_tokens: usize,
    /// Hard cap applied before the token budget is considered.
    pub max_messages: usize,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            max_tokens: 4000,
            max_messages: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Window {
    /// Chronological suffix of the input.
    pub windowed: Vec<Message>,
    /// Whether any earlier message was left out.
    pub has_older: bool,
}

/// Index of the first message inside the window.
///
/// Everything before the returned index is "older than the window". The
/// newest message is always inside, even when it alone exceeds the budget.
pub fn window_start(messages: &[Message], policy: WindowPolicy) -> usize {
    let Some(newest) = messages.len().checked_sub(1) else {
        return 0;
    };
    let floor = messages.len().saturating_sub(policy.max_messages.max(1));

    let mut start = newest;
    let mut total = estimate_tokens(&messages[newest].content);
    for idx in (floor..newest).rev() {
        total += estimate_tokens(&messages[idx].content);
        if total > policy.max_tokens {
            break;
        }
        start = idx;
    }
    start
}

pub fn select_window(messages: &[Message], policy: WindowPolicy) -> Window {
    let start = window_start(messages, policy);
    Window {
        windowed: messages[start..].to_vec(),
        has_older: start > 0,
    }
}

/// Messages that fell outside the window, oldest first.
pub fn older_prefix(messages: &[Message], policy: WindowPolicy) -> &[Message] {
    &messages[..window_start(messages, policy)]
}
