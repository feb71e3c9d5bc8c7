//! Stage 3: TF-ISF keyword extraction.
//!
//! `tf = occurrences / total_words`, `isf = ln(sentences / sentences_with_term)`.
//! Sentence frequency is computed over the single document only. Reported
//! scores are divided by the best raw score so they fall in `[0, 1]`.

use std::collections::{BTreeMap, BTreeSet};

use flashdeck_core::KeywordScore;

use crate::tokenize::{content_terms, words};

struct TermStats {
    occurrences: usize,
    sentences: usize,
    first_sentence: usize,
}

/// Top `top_n` terms by descending score, ties broken alphabetically.
pub fn extract_keywords(sentences: &[String], top_n: usize, min_term_len: usize) -> Vec<KeywordScore> {
    if top_n == 0 || sentences.is_empty() {
        return Vec::new();
    }

    let total_words: usize = sentences.iter().map(|s| words(s).len()).sum();
    if total_words == 0 {
        return Vec::new();
    }

    // BTreeMap keeps iteration order independent of hashing.
    let mut terms: BTreeMap<String, TermStats> = BTreeMap::new();
    for (idx, sentence) in sentences.iter().enumerate() {
        let tokens = content_terms(sentence, min_term_len);
        let distinct: BTreeSet<&str> = tokens.iter().map(String::as_str).collect();

        for token in &tokens {
            terms
                .entry(token.clone())
                .or_insert(TermStats {
                    occurrences: 0,
                    sentences: 0,
                    first_sentence: idx,
                })
                .occurrences += 1;
        }
        for term in distinct {
            if let Some(stats) = terms.get_mut(term) {
                stats.sentences += 1;
            }
        }
    }

    let sentence_count = sentences.len() as f64;
    let mut scored: Vec<(String, f64, usize)> = terms
        .into_iter()
        .map(|(term, stats)| {
            let tf = stats.occurrences as f64 / total_words as f64;
            let isf = (sentence_count / stats.sentences as f64).ln();
            (term, tf * isf, stats.first_sentence)
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored.truncate(top_n);

    let max = scored.first().map(|(_, score, _)| *score).unwrap_or(0.0);

    scored
        .into_iter()
        .map(|(term, raw, first)| KeywordScore {
            term,
            score: if max > 0.0 { raw / max } else { 0.0 },
            example: sentences[first].clone(),
        })
        .collect()
}
