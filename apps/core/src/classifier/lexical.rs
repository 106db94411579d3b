//! Lexical classifier: phrase, keyword and regex scoring with an in-memory cache.

use chrono::Utc;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::metrics::{normalize, TextMetrics};
use super::result::{CategoryScore, ClassificationResult, ClassifyOptions};
use super::rules::{ClassifierRules, CompiledRules};
use crate::error::AppError;

const DESCRIPTOR_WEIGHT: f32 = 0.6;
const CONTEXT_WEIGHT: f32 = 0.4;
const TOPIC_BOOST: f32 = 0.2;
const STYLE_BOOST: f32 = 0.1;
const CACHE_KEY_PREFIX_CHARS: usize = 100;

/// Cache counters, mostly for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Scores text against static category/topic/style tables.
///
/// Results are cached until [`LexicalClassifier::clear_cache`] is called. The
/// cache is unbounded unless built with [`LexicalClassifier::with_cache_capacity`].
pub struct LexicalClassifier {
    rules: CompiledRules,
    cache: Mutex<LruCache<String, Arc<ClassificationResult>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for LexicalClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LexicalClassifier {
    /// Classifier over the built-in rule tables.
    pub fn new() -> Self {
        let rules = ClassifierRules::default()
            .compile()
            .expect("Built-in classifier rules must compile");
        Self::from_compiled(rules, None)
    }

    /// Classifier over a caller-supplied rule set.
    pub fn with_rules(rules: &ClassifierRules) -> Result<Self, AppError> {
        Ok(Self::from_compiled(rules.compile()?, None))
    }

    /// Same as [`Self::with_rules`] but evicting least-recently-used results past `capacity`.
    pub fn with_cache_capacity(
        rules: &ClassifierRules,
        capacity: NonZeroUsize,
    ) -> Result<Self, AppError> {
        Ok(Self::from_compiled(rules.compile()?, Some(capacity)))
    }

    fn from_compiled(rules: CompiledRules, capacity: Option<NonZeroUsize>) -> Self {
        let cache = match capacity {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        Self {
            rules,
            cache: Mutex::new(cache),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn cache(&self) -> MutexGuard<'_, LruCache<String, Arc<ClassificationResult>>> {
        // A panic while holding the lock leaves the cache intact, so keep using it.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Classify `text`, returning a cached result when one exists for the same input.
    pub fn classify(&self, text: &str, options: &ClassifyOptions) -> Arc<ClassificationResult> {
        let normalized = normalize(text);
        let key = cache_key(&normalized, options);

        if let Some(hit) = self.cache().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(hit);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = Arc::new(self.compute(&normalized, options));
        debug!("Classified text: {}", result.summary());

        self.cache().put(key, Arc::clone(&result));
        result
    }

    pub fn clear_cache(&self) {
        self.cache().clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache().len(),
        }
    }

    fn compute(&self, normalized: &str, options: &ClassifyOptions) -> ClassificationResult {
        let topics = self.score_topics(normalized);
        let styles = self.score_styles(normalized);

        let mut ranked: Vec<CategoryScore> = self
            .rules
            .categories
            .iter()
            .map(|category| {
                let score = DESCRIPTOR_WEIGHT * coverage(&category.descriptors, normalized)
                    + CONTEXT_WEIGHT * coverage(&category.context_markers, normalized);
                let score = score.clamp(0.0, 1.0);
                CategoryScore {
                    name: category.name.clone(),
                    score,
                    confidence: self.adjust_confidence(&category.name, score, &topics, &styles),
                }
            })
            .collect();

        // Stable sort keeps table order among ties.
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut ranked = ranked.into_iter();
        let primary = ranked
            .next()
            .expect("Compiled rules always contain at least one category");
        let secondary = ranked
            .filter(|c| options.include_zero_scores || c.score > 0.0)
            .take(options.max_secondary)
            .collect();

        ClassificationResult {
            primary,
            secondary,
            topics,
            styles,
            metrics: TextMetrics::compute(normalized),
            created_at: Utc::now(),
        }
    }

    fn score_topics(&self, normalized: &str) -> BTreeMap<String, f32> {
        self.rules
            .topics
            .iter()
            .map(|topic| {
                let score = (coverage(&topic.keywords, normalized) * topic.weight).clamp(0.0, 1.0);
                (topic.name.clone(), score)
            })
            .collect()
    }

    fn score_styles(&self, normalized: &str) -> BTreeMap<String, f32> {
        self.rules
            .styles
            .iter()
            .map(|style| {
                let matches: usize = style
                    .patterns
                    .iter()
                    .map(|p| p.find_iter(normalized).count())
                    .sum();
                let score = (matches as f32 * style.weight / 10.0).clamp(0.0, 1.0);
                (style.name.clone(), score)
            })
            .collect()
    }

    fn adjust_confidence(
        &self,
        category: &str,
        raw: f32,
        topics: &BTreeMap<String, f32>,
        styles: &BTreeMap<String, f32>,
    ) -> f32 {
        let mut confidence = raw;
        for name in self.rules.category_topics.get(category).into_iter().flatten() {
            confidence *= 1.0 + topics.get(name).copied().unwrap_or(0.0) * TOPIC_BOOST;
        }
        for name in self.rules.category_styles.get(category).into_iter().flatten() {
            confidence *= 1.0 + styles.get(name).copied().unwrap_or(0.0) * STYLE_BOOST;
        }
        confidence.min(1.0)
    }
}

/// Fraction of `phrases` occurring literally in `text`; 0 for an empty list.
fn coverage(phrases: &[String], text: &str) -> f32 {
    if phrases.is_empty() {
        return 0.0;
    }
    let matched = phrases.iter().filter(|p| text.contains(p.as_str())).count();
    matched as f32 / phrases.len() as f32
}

/// Readable prefix plus a digest of the whole text, so long inputs sharing a
/// prefix get distinct entries.
fn cache_key(normalized: &str, options: &ClassifyOptions) -> String {
    let prefix: String = normalized.chars().take(CACHE_KEY_PREFIX_CHARS).collect();
    let digest = Sha256::digest(normalized.as_bytes());
    let options = serde_json::to_string(options).unwrap_or_default();
    format!("{}|{:x}|{}", prefix, digest, options)
}
