//! Heuristic pre-flight token estimation.
//!
//! No tokenizer is shipped, so the estimate is the maximum of two rough
//! heuristics: a whitespace word count and a character-density count.
//! The density ratio depends on the script mix: Cyrillic-heavy text
//! tokenizes much denser than Latin text on the models we proxy.

/// Characters per token for mostly-Latin text.
const LATIN_CHARS_PER_TOKEN: f64 = 4.0;
/// Characters per token for Cyrillic-heavy text.
const CYRILLIC_CHARS_PER_TOKEN: f64 = 2.0;
/// Fraction of Cyrillic code points above which the denser ratio applies.
const CYRILLIC_THRESHOLD: f64 = 0.3;

/// Fixed per-message metadata overhead, in tokens.
const MESSAGE_OVERHEAD_TOKENS: u32 = 4;
/// Assumed completion length when the caller sets no max_tokens cap.
pub const DEFAULT_COMPLETION_TOKENS: u32 = 400;

/// Estimate the token count of a piece of text.
///
/// Returns the maximum of the word-count and character-density heuristics,
/// floored to an integer. Empty text yields 0. Monotonic non-decreasing in
/// text length for a fixed script mix.
pub fn estimate_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }

    let word_estimate = text.split_whitespace().count() as u32;

    let total_chars = text.chars().count();
    let cyrillic_chars = text
        .chars()
        .filter(|c| ('\u{0400}'..='\u{04FF}').contains(c))
        .count();
    let ratio = if cyrillic_chars as f64 > total_chars as f64 * CYRILLIC_THRESHOLD {
        CYRILLIC_CHARS_PER_TOKEN
    } else {
        LATIN_CHARS_PER_TOKEN
    };
    let density_estimate = (total_chars as f64 / ratio).floor() as u32;

    word_estimate.max(density_estimate)
}

/// Estimate the prompt tokens of a full request: system prompt, capped
/// history, and the new user message, with a fixed per-message overhead.
pub fn estimate_prompt_tokens<'a, I>(system_prompt: &str, history: I, message: &str) -> u32
where
    I: IntoIterator<Item = &'a str>,
{
    let mut total = estimate_tokens(system_prompt);

    for entry in history {
        total += estimate_tokens(entry) + MESSAGE_OVERHEAD_TOKENS;
    }

    total + estimate_tokens(message) + MESSAGE_OVERHEAD_TOKENS
}
