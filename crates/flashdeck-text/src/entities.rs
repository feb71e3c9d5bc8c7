//! Stage 4: capitalized-phrase entity detection.
//!
//! An entity is a maximal run of capitalized tokens inside one sentence.
//! Punctuation attached to a token ends the run on that side. A run made of
//! just the sentence's first word is ignored, since sentence-initial
//! capitalization says nothing. Short all-caps acronyms only count when the
//! text repeats them.

use std::collections::{HashMap, HashSet};

use flashdeck_core::{Entity, EntityKind};
use regex::Regex;

use crate::tokenize::is_stop_word;

#[derive(Debug, Clone, Copy)]
pub struct EntityOptions {
    pub max_entities: usize,
    pub acronym_min_len: usize,
    pub acronym_min_repeats: usize,
}

#[derive(Debug)]
struct Token<'a> {
    core: &'a str,
    position: usize,
    breaks_before: bool,
    breaks_after: bool,
}

/// Detect entities across `sentences`, first-seen order, deduplicated by surface text.
pub fn detect_entities(sentences: &[String], options: EntityOptions) -> Vec<Entity> {
    if options.max_entities == 0 {
        return Vec::new();
    }

    let tokenized: Vec<Vec<Token<'_>>> = sentences.iter().map(|s| tokenize(s)).collect();

    let mut occurrences: HashMap<&str, usize> = HashMap::new();
    for token in tokenized.iter().flatten() {
        *occurrences.entry(token.core).or_insert(0) += 1;
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut entities = Vec::new();

    'sentences: for (sentence, tokens) in sentences.iter().zip(&tokenized) {
        let is_candidate = |token: &Token<'_>| {
            is_capitalized(token.core)
                && !is_stop_word(token.core)
                && acronym_allowed(token.core, &occurrences, options)
        };

        for run in capitalized_runs(tokens, is_candidate) {
            if run.len() == 1 && run[0].position == 0 {
                continue;
            }
            let text = run.iter().map(|t| t.core).collect::<Vec<_>>().join(" ");
            if !seen.insert(text.clone()) {
                continue;
            }

            let definition = find_definition(&text, sentences);
            entities.push(Entity {
                kind: if definition.is_some() {
                    EntityKind::Term
                } else {
                    EntityKind::Unknown
                },
                text,
                context: sentence.clone(),
                definition,
            });

            if entities.len() >= options.max_entities {
                break 'sentences;
            }
        }
    }

    entities
}

fn tokenize(sentence: &str) -> Vec<Token<'_>> {
    sentence
        .split(' ')
        .filter(|raw| !raw.is_empty())
        .enumerate()
        .map(|(position, raw)| {
            let leading = raw.trim_start_matches(|c: char| !c.is_alphanumeric());
            let mut core = leading.trim_end_matches(|c: char| !c.is_alphanumeric());
            let mut breaks_after = core.len() != leading.len();

            for suffix in ["'s", "’s"] {
                if let Some(stripped) = core.strip_suffix(suffix) {
                    if !stripped.is_empty() {
                        core = stripped;
                        breaks_after = true;
                    }
                }
            }

            Token {
                core,
                position,
                breaks_before: leading.len() != raw.len(),
                breaks_after,
            }
        })
        .collect()
}

/// Split tokens into maximal runs accepted by `is_candidate`.
fn capitalized_runs<'t, 'a>(
    tokens: &'t [Token<'a>],
    is_candidate: impl Fn(&Token<'a>) -> bool,
) -> Vec<&'t [Token<'a>]> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;

    for (idx, token) in tokens.iter().enumerate() {
        if !is_candidate(token) {
            if let Some(s) = start.take() {
                runs.push(&tokens[s..idx]);
            }
            continue;
        }

        if token.breaks_before {
            if let Some(s) = start.take() {
                runs.push(&tokens[s..idx]);
            }
        }
        let s = *start.get_or_insert(idx);
        if token.breaks_after {
            runs.push(&tokens[s..=idx]);
            start = None;
        }
    }

    if let Some(s) = start {
        runs.push(&tokens[s..]);
    }
    runs
}

fn is_capitalized(core: &str) -> bool {
    let mut chars = core.chars();
    match chars.next() {
        Some(first) => first.is_uppercase() && chars.next().is_some(),
        None => false,
    }
}

fn is_acronym(core: &str) -> bool {
    core.chars().filter(|c| c.is_alphabetic()).count() > 1
        && core
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(char::is_uppercase)
}

fn acronym_allowed(core: &str, occurrences: &HashMap<&str, usize>, options: EntityOptions) -> bool {
    if !is_acronym(core) || core.chars().count() >= options.acronym_min_len {
        return true;
    }
    occurrences.get(core).copied().unwrap_or(0) >= options.acronym_min_repeats
}

/// First "`<entity>` is a/an `<phrase>`" in the document.
fn find_definition(entity: &str, sentences: &[String]) -> Option<String> {
    let pattern = format!(
        r"(?i)\b{}\s+(?:is|are)\s+(?:a|an)\s+([^,.;:!?]+)",
        regex::escape(entity)
    );
    let re = Regex::new(&pattern).ok()?;

    sentences.iter().find_map(|sentence| {
        re.captures(sentence)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|d| !d.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> EntityOptions {
        EntityOptions {
            max_entities: 20,
            acronym_min_len: 3,
            acronym_min_repeats: 2,
        }
    }

    fn sentences(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn texts(entities: &[Entity]) -> Vec<&str> {
        entities.iter().map(|e| e.text.as_str()).collect()
    }

    #[test]
    fn multi_token_run_mid_sentence() {
        let input = sentences(&[
            "Machine learning is a subset of Artificial Intelligence.",
            "Neural networks model neurons.",
        ]);
        let entities = detect_entities(&input, options());
        assert_eq!(texts(&entities), vec!["Artificial Intelligence"]);
        assert_eq!(entities[0].context, input[0]);
        assert_eq!(entities[0].kind, EntityKind::Unknown);
    }

    #[test]
    fn sentence_initial_run_of_several_tokens_is_kept() {
        let input = sentences(&["New York hosts many events."]);
        assert_eq!(texts(&detect_entities(&input, options())), vec!["New York"]);
    }

    #[test]
    fn punctuation_splits_runs() {
        let input = sentences(&["We visited Paris, London and Berlin (Germany) last year."]);
        assert_eq!(
            texts(&detect_entities(&input, options())),
            vec!["Paris", "London", "Berlin", "Germany"]
        );
    }

    #[test]
    fn capitalized_stop_words_break_runs() {
        let input = sentences(&["In Rust The Book is free."]);
        assert_eq!(texts(&detect_entities(&input, options())), vec!["Rust", "Book"]);
    }

    #[test]
    fn short_acronyms_need_repeats() {
        let once = sentences(&["Our AI beat the NASA model."]);
        assert_eq!(texts(&detect_entities(&once, options())), vec!["NASA"]);

        let twice = sentences(&["We trust the AI model.", "The AI won again."]);
        assert_eq!(texts(&detect_entities(&twice, options())), vec!["AI"]);
    }

    #[test]
    fn dedupes_keeping_first_context() {
        let input = sentences(&["We like Ferris Crab.", "Everyone likes Ferris Crab."]);
        let entities = detect_entities(&input, options());
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].context, input[0]);
    }

    #[test]
    fn possessive_is_stripped() {
        let input = sentences(&["They praised Mozilla's work."]);
        assert_eq!(texts(&detect_entities(&input, options())), vec!["Mozilla"]);
    }

    #[test]
    fn definition_marks_term() {
        let input = sentences(&[
            "The crate uses Tokio Runtime heavily.",
            "Tokio Runtime is an async executor for Rust.",
        ]);
        let entities = detect_entities(&input, options());
        let tokio = entities.iter().find(|e| e.text == "Tokio Runtime").unwrap();
        assert_eq!(tokio.kind, EntityKind::Term);
        assert_eq!(tokio.definition.as_deref(), Some("async executor for Rust"));
        assert_eq!(tokio.context, input[0]);
    }

    #[test]
    fn caps_at_max_entities() {
        let input = sentences(&["We met Alice, Bob, Carol, Dave and Erin."]);
        let mut opts = options();
        opts.max_entities = 3;
        assert_eq!(
            texts(&detect_entities(&input, opts)),
            vec!["Alice", "Bob", "Carol"]
        );
    }
}
