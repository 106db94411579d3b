//! Text normalization, tokenization and basic text metrics.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid regex: whitespace run"));

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\W+").expect("Invalid regex: non-word run"));

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+").expect("Invalid regex: sentence terminators"));

/// Trim, collapse internal whitespace to single spaces, lowercase.
pub fn normalize(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").to_lowercase()
}

/// Words are the non-empty pieces between runs of non-word characters.
pub fn tokenize_words(text: &str) -> Vec<&str> {
    NON_WORD.split(text).filter(|w| !w.is_empty()).collect()
}

/// Sentences are the non-blank pieces between runs of `.`, `!` or `?`.
pub fn split_sentences(text: &str) -> Vec<&str> {
    SENTENCE_END
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Basic shape of a text.
///
/// Averages are `0.0` when there is nothing to average over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMetrics {
    pub word_count: usize,
    pub sentence_count: usize,
    /// Mean characters per word.
    pub avg_word_length: f32,
    /// Mean words per sentence.
    pub avg_sentence_length: f32,
}

impl TextMetrics {
    /// Computes metrics over already-normalized text.
    pub fn compute(normalized: &str) -> Self {
        let words = tokenize_words(normalized);
        let sentence_count = split_sentences(normalized).len();
        let word_count = words.len();

        let total_chars: usize = words.iter().map(|w| w.chars().count()).sum();
        let avg_word_length = ratio(total_chars, word_count);
        let avg_sentence_length = ratio(word_count, sentence_count);

        Self {
            word_count,
            sentence_count,
            avg_word_length,
            avg_sentence_length,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f32 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f32 / denominator as f32
    }
}
