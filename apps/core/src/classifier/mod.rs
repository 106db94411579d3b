//! # Classifier Module
//!
//! Fast, deterministic scoring of free text against static rule tables.
//!
//! ## Components
//! - `rules`: category/topic/style tables, built-in defaults and JSON loading
//! - `metrics`: normalization, tokenization and text metrics
//! - `result`: output data structures
//! - `lexical`: the scoring engine and its result cache

pub mod lexical;
pub mod metrics;
pub mod result;
pub mod rules;

pub use lexical::{CacheStats, LexicalClassifier};
pub use metrics::TextMetrics;
pub use result::{CategoryScore, ClassificationResult, ClassifyOptions};
pub use rules::{CategoryRule, ClassifierRules, StyleRule, TopicRule};
