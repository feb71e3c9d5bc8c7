//! Word tokenization and the fixed stop-list shared by every stage.

use once_cell::sync::Lazy;
use regex::Regex;

/// Letters/digits with optional apostrophe suffixes ("don't", "o'clock").
static WORD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+(?:['’][\p{L}]+)*").expect("valid word pattern"));

/// Function words excluded from frequency, keyword, and entity scoring.
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "being", "but", "by", "for", "from",
    "has", "have", "in", "is", "it", "its", "of", "on", "or", "that", "the", "these", "this",
    "those", "to", "was", "were", "with",
];

/// Case-insensitive stop-list membership.
pub fn is_stop_word(word: &str) -> bool {
    let lower = word.to_lowercase();
    STOP_WORDS.binary_search(&lower.as_str()).is_ok()
}

/// All word tokens of `text`, lower-cased, in order.
pub fn words(text: &str) -> Vec<String> {
    WORD_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Whether a lower-cased token takes part in scoring.
pub fn is_content_term(token: &str, min_len: usize) -> bool {
    token.chars().count() >= min_len
        && token.chars().any(char::is_alphabetic)
        && STOP_WORDS.binary_search(&token).is_err()
}

/// Lower-cased scoring terms of `text`, in order, duplicates kept.
pub fn content_terms(text: &str, min_len: usize) -> Vec<String> {
    words(text)
        .into_iter()
        .filter(|t| is_content_term(t, min_len))
        .collect()
}
