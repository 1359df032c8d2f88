//! Prompt text used by the turn pipeline.

const SYSTEM_PROMPT: &str = "You are a helpful assistant for a team workspace. \
Answer clearly and concisely. If you are unsure, say so instead of guessing.";

const SYSTEM_PROMPT_WITH_DOCUMENTS: &str = "You are a helpful assistant for a team workspace. \
Documents have been attached to this chat and can be searched with the search_documents tool. \
Use it for questions about facts, figures or content that may be in those documents, and base \
your answer on what it returns. Cite the document when you use it. Do not search for greetings, \
small talk or general knowledge. If the documents do not contain the answer, say so.";

const FALLBACK_EN: &str = "No language model is configured for this chat yet. \
Ask an administrator to connect a model provider, then try again.";

const FALLBACK_DE: &str = "Für diesen Chat ist noch kein Sprachmodell konfiguriert. \
Bitte einen Administrator, einen Modellanbieter zu verbinden, und versuche es dann erneut.";

pub const SUMMARY_SYSTEM_PROMPT: &str = "You compress chat transcripts into short summaries \
that another assistant will read as background context.";

pub const TITLE_SYSTEM_PROMPT: &str = "You write short, descriptive titles for conversations. \
Reply with the title only, without quotes or punctuation at the end.";

/// Base prompt, plus a response-language line when a locale is given.
pub fn system_prompt(has_documents: bool, locale: Option<&str>) -> String {
    let base = if has_documents {
        SYSTEM_PROMPT_WITH_DOCUMENTS
    } else {
        SYSTEM_PROMPT
    };

    match locale.map(str::trim).filter(|l| !l.is_empty()) {
        Some(locale) => format!("{}\n\nRespond in the language of the locale \"{}\".", base, locale),
        None => base.to_string(),
    }
}

/// Reply stored when the chat has no model connector.
pub fn fallback_reply(locale: Option<&str>) -> &'static str {
    match language(locale) {
        Some("de") => FALLBACK_DE,
        _ => FALLBACK_EN,
    }
}

pub fn summary_prompt(transcript: &str, max_words: usize) -> String {
    format!(
        "Summarize the following conversation in at most {} words. Keep the topics discussed, \
decisions made and facts the user shared. Write plain prose without headings.\n\n{}",
        max_words, transcript
    )
}

pub fn title_prompt(user_text: &str, assistant_text: &str, max_chars: usize) -> String {
    format!(
        "Write a title of at most {} characters for this exchange.\n\nUser: {}\n\nAssistant: {}",
        max_chars, user_text, assistant_text
    )
}

pub const SUMMARY_PREAMBLE: &str = "Previous conversation summary:";
pub const SUMMARY_ACKNOWLEDGEMENT: &str =
    "Understood. I will use this summary as context for the rest of the conversation.";

fn language(locale: Option<&str>) -> Option<&str> {
    locale
        .and_then(|l| l.split(['-', '_']).next())
        .map(str::trim)
        .filter(|l| !l.is_empty())
}
