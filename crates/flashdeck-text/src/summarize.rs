//! Stage 2: frequency-weighted extractive summary.

use std::collections::HashMap;

use crate::tokenize::{content_terms, words};

/// Pick the `k` best sentences and return them in document order.
///
/// A sentence scores the summed whole-text frequency of its content terms
/// divided by its word count. Equal scores go to the earlier sentence.
pub fn summarize(sentences: &[String], k: usize, min_term_len: usize) -> Vec<String> {
    let k = k.min(sentences.len());
    if k == 0 {
        return Vec::new();
    }

    let mut frequency: HashMap<String, usize> = HashMap::new();
    for sentence in sentences {
        for term in content_terms(sentence, min_term_len) {
            *frequency.entry(term).or_insert(0) += 1;
        }
    }

    let mut scored: Vec<(usize, f64)> = sentences
        .iter()
        .enumerate()
        .map(|(idx, sentence)| (idx, sentence_score(sentence, &frequency, min_term_len)))
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut picked: Vec<usize> = scored.into_iter().take(k).map(|(idx, _)| idx).collect();
    picked.sort_unstable();

    picked
        .into_iter()
        .map(|idx| sentences[idx].clone())
        .collect()
}

fn sentence_score(sentence: &str, frequency: &HashMap<String, usize>, min_term_len: usize) -> f64 {
    let length = words(sentence).len();
    if length == 0 {
        return 0.0;
    }
    let weight: usize = content_terms(sentence, min_term_len)
        .iter()
        .map(|term| frequency.get(term).copied().unwrap_or(0))
        .sum();
    weight as f64 / length as f64
}
