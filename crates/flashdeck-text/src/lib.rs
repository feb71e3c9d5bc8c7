//! # flashdeck-text
//!
//! Heuristic text pipeline that turns one document into a flashcard deck.
//!
//! Five stages run in a fixed order, each consuming the previous output:
//!
//! 1. [`normalize`]: sentence splitting and text statistics
//! 2. [`summarize`]: frequency-weighted extractive summary
//! 3. [`keywords`]: TF-ISF keyword ranking
//! 4. [`entities`]: capitalized-phrase entity detection
//! 5. [`deck`]: card assembly
//!
//! The pipeline is pure and deterministic: identical input always yields an
//! identical [`PipelineResult`].

pub mod deck;
pub mod entities;
pub mod keywords;
pub mod normalize;
pub mod summarize;
pub mod tokenize;

use std::time::Instant;

use flashdeck_core::{defaults, Error, PipelineResult, Result};
use tracing::debug;

use crate::entities::EntityOptions;

/// Tunables for [`TextPipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Sentences kept in the summary (capped by the sentence count).
    pub summary_sentences: usize,
    /// Keyword cards per deck.
    pub max_keywords: usize,
    /// Entity cards per deck.
    pub max_entities: usize,
    /// Shortest token that takes part in frequency scoring.
    pub min_term_len: usize,
    /// All-caps tokens shorter than this must repeat to count as entities.
    pub acronym_min_len: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            summary_sentences: defaults::SUMMARY_SENTENCES,
            max_keywords: defaults::MAX_KEYWORDS,
            max_entities: defaults::MAX_ENTITIES,
            min_term_len: defaults::MIN_TERM_LEN,
            acronym_min_len: defaults::ACRONYM_MIN_LEN,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `PIPELINE_SUMMARY_SENTENCES` | `3` |
    /// | `PIPELINE_MAX_KEYWORDS` | `10` |
    /// | `PIPELINE_MAX_ENTITIES` | `20` |
    /// | `PIPELINE_MIN_TERM_LEN` | `3` |
    /// | `PIPELINE_ACRONYM_MIN_LEN` | `3` |
    pub fn from_env() -> Self {
        fn var(name: &str, default: usize) -> usize {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(default)
        }

        Self {
            summary_sentences: var("PIPELINE_SUMMARY_SENTENCES", defaults::SUMMARY_SENTENCES),
            max_keywords: var("PIPELINE_MAX_KEYWORDS", defaults::MAX_KEYWORDS),
            max_entities: var("PIPELINE_MAX_ENTITIES", defaults::MAX_ENTITIES),
            min_term_len: var("PIPELINE_MIN_TERM_LEN", defaults::MIN_TERM_LEN).max(1),
            acronym_min_len: var("PIPELINE_ACRONYM_MIN_LEN", defaults::ACRONYM_MIN_LEN),
        }
    }

    pub fn with_summary_sentences(mut self, n: usize) -> Self {
        self.summary_sentences = n;
        self
    }

    pub fn with_max_keywords(mut self, n: usize) -> Self {
        self.max_keywords = n;
        self
    }

    pub fn with_max_entities(mut self, n: usize) -> Self {
        self.max_entities = n;
        self
    }

    pub fn with_min_term_len(mut self, n: usize) -> Self {
        self.min_term_len = n.max(1);
        self
    }

    pub fn with_acronym_min_len(mut self, n: usize) -> Self {
        self.acronym_min_len = n;
        self
    }
}

/// Reject input the pipeline must never run on.
pub fn validate_input(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::Validation("document text is empty".to_string()));
    }
    Ok(())
}

/// The five-stage document-to-deck pipeline.
#[derive(Debug, Clone, Default)]
pub struct TextPipeline {
    config: PipelineConfig,
}

impl TextPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage over `text`.
    ///
    /// Fails only with [`Error::Validation`] for empty or whitespace-only text.
    pub fn process(&self, text: &str, source_name: &str) -> Result<PipelineResult> {
        validate_input(text)?;
        let start = Instant::now();
        let cfg = &self.config;

        let normalized = normalize::normalize(text);
        let sentences = normalized.sentences;

        let summary =
            summarize::summarize(&sentences, cfg.summary_sentences, cfg.min_term_len);
        let keywords =
            keywords::extract_keywords(&sentences, cfg.max_keywords, cfg.min_term_len);
        let entities = entities::detect_entities(
            &sentences,
            EntityOptions {
                max_entities: cfg.max_entities,
                acronym_min_len: cfg.acronym_min_len,
                acronym_min_repeats: defaults::ACRONYM_MIN_REPEATS,
            },
        );
        let deck = deck::assemble(&keywords, &entities, &summary);
        let deck_csv = deck.to_csv();

        debug!(
            source_name,
            sentences = normalized.stats.sentence_count,
            words = normalized.stats.word_count,
            summary = summary.len(),
            keywords = keywords.len(),
            entities = entities.len(),
            card_count = deck.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Pipeline finished"
        );

        Ok(PipelineResult {
            source_name: source_name.to_string(),
            stats: normalized.stats,
            summary,
            keywords,
            entities,
            deck,
            deck_csv,
        })
    }
}

/// Run the pipeline with default settings.
pub fn process(text: &str, source_name: &str) -> Result<PipelineResult> {
    TextPipeline::default().process(text, source_name)
}
