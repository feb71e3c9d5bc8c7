//! Stage 1: whitespace normalization and sentence splitting.
//!
//! A sentence ends at `.`, `!` or `?` (plus any trailing punctuation run and
//! closing quotes/brackets) when followed by whitespace and a capital letter,
//! unless the period closes a known abbreviation, an initial, or a dotted
//! acronym such as `U.S.`.

use flashdeck_core::TextStats;

/// Lower-cased abbreviations whose trailing period never ends a sentence.
const ABBREVIATIONS: &[&str] = &[
    "approx", "capt", "cf", "col", "corp", "dept", "dr", "e.g", "etc", "fig", "gen", "gov",
    "i.e", "inc", "jr", "lt", "ltd", "mr", "mrs", "ms", "mt", "no", "prof", "sgt", "sr", "st",
    "vs",
];

/// Output of normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub sentences: Vec<String>,
    pub stats: TextStats,
}

/// Collapse whitespace and split into sentences.
///
/// Text without any sentence boundary comes back as a single sentence;
/// whitespace-only text yields none.
pub fn normalize(text: &str) -> Normalized {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let sentences = split_sentences(&collapsed);

    let stats = TextStats {
        char_count: collapsed.chars().count(),
        word_count: collapsed.split_whitespace().count(),
        sentence_count: sentences.len(),
    };

    Normalized { sentences, stats }
}

/// Split whitespace-collapsed text (single spaces) into trimmed, non-empty sentences.
fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (byte_idx, c) = chars[i];
        if !is_terminal(c) {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < chars.len() && (is_terminal(chars[j].1) || is_closing(chars[j].1)) {
            j += 1;
        }

        let at_boundary = j < chars.len()
            && chars[j].1 == ' '
            && starts_sentence(&chars[j + 1..])
            && !(c == '.' && ends_with_abbreviation(&text[start..byte_idx]));

        if at_boundary {
            push_sentence(&mut sentences, &text[start..chars[j].0]);
            start = chars[j].0 + 1;
            i = j + 1;
        } else {
            i = j;
        }
    }

    push_sentence(&mut sentences, &text[start..]);
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, candidate: &str) {
    let trimmed = candidate.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '”' | '’')
}

fn is_opening(c: char) -> bool {
    matches!(c, '"' | '\'' | '(' | '[' | '“' | '‘')
}

/// Next sentence must open with a capital letter, optionally after quotes/brackets.
fn starts_sentence(rest: &[(usize, char)]) -> bool {
    rest.iter()
        .map(|&(_, c)| c)
        .find(|&c| !is_opening(c))
        .is_some_and(char::is_uppercase)
}

/// Whether the last word before a period is an abbreviation, initial, or dotted acronym.
fn ends_with_abbreviation(before_dot: &str) -> bool {
    let word = before_dot
        .rsplit(' ')
        .next()
        .unwrap_or_default()
        .trim_start_matches(is_opening);

    if word.is_empty() {
        return false;
    }
    if word.chars().count() == 1 && word.chars().all(char::is_alphabetic) {
        return true;
    }
    if word.contains('.') {
        return true;
    }

    let lower = word.to_lowercase();
    ABBREVIATIONS.contains(&lower.as_str())
}
