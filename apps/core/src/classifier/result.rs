//! Classification output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::metrics::TextMetrics;

/// A ranked category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub name: String,
    /// Raw phrase-coverage score in [0, 1], used for ranking.
    pub score: f32,
    /// Score after topic/style boosts, capped at 1.0.
    pub confidence: f32,
}

/// Options that shape a classification. Part of the cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyOptions {
    /// How many runner-up categories to report.
    pub max_secondary: usize,
    /// Report the next `max_secondary` categories whatever their score. When
    /// false, runner-ups that matched nothing are left out.
    pub include_zero_scores: bool,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            max_secondary: 2,
            include_zero_scores: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub primary: CategoryScore,
    pub secondary: Vec<CategoryScore>,
    pub topics: BTreeMap<String, f32>,
    pub styles: BTreeMap<String, f32>,
    pub metrics: TextMetrics,
    pub created_at: DateTime<Utc>,
}

impl ClassificationResult {
    /// One-line description for logs.
    pub fn summary(&self) -> String {
        let secondary = self
            .secondary
            .iter()
            .map(|c| format!("{} ({:.0}%)", c.name, c.confidence * 100.0))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "Primary: {} ({:.0}%), Secondary: [{}], Words: {}",
            self.primary.name,
            self.primary.confidence * 100.0,
            secondary,
            self.metrics.word_count
        )
    }

    /// Highest-scoring topic, if any topic scored above zero.
    pub fn dominant_topic(&self) -> Option<(&str, f32)> {
        self.topics
            .iter()
            .filter(|(_, score)| **score > 0.0)
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(name, score)| (name.as_str(), *score))
    }
}
