//! Character-based token estimation.
//!
//! Every budget comparison in the pipeline goes through [`estimate_tokens`], so
//! windowing, quota checks and persisted counts agree with each other even
//! though none of them match a provider's real tokenizer.

/// Average characters per token for typical English prose.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimates the token count of `text` as `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Estimate clamped into the `i32` column used for persisted counts.
pub fn estimate_tokens_i32(text: &str) -> i32 {
    i32::try_from(estimate_tokens(text)).unwrap_or(i32::MAX)
}
