//! Static rule tables for the lexical classifier.
//!
//! Tables are plain serde data so they can be versioned and shipped as JSON
//! next to the binary; [`ClassifierRules::default`] carries the built-in set.

use crate::error::AppError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::info;

use super::metrics::normalize;

/// File name looked up inside the rules directory.
pub const RULES_FILE: &str = "classifier.json";

/// A content category recognised by literal phrase matching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryRule {
    pub name: String,
    /// Phrases that describe the category itself (60% of the score).
    pub descriptors: Vec<String>,
    /// Phrases that usually surround it (40% of the score).
    pub context_markers: Vec<String>,
}

/// A subject area scored by keyword coverage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicRule {
    pub name: String,
    pub keywords: Vec<String>,
    /// Multiplier in [0, 1].
    pub weight: f32,
}

/// A writing style scored by regex match counts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StyleRule {
    pub name: String,
    pub patterns: Vec<String>,
    pub weight: f32,
}

/// Complete rule set for the classifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifierRules {
    pub categories: Vec<CategoryRule>,
    pub topics: Vec<TopicRule>,
    pub styles: Vec<StyleRule>,
    /// Topics whose score boosts a category's confidence.
    #[serde(default)]
    pub category_topics: BTreeMap<String, Vec<String>>,
    /// Styles whose score boosts a category's confidence.
    #[serde(default)]
    pub category_styles: BTreeMap<String, Vec<String>>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn category(name: &str, descriptors: &[&str], context_markers: &[&str]) -> CategoryRule {
    CategoryRule {
        name: name.to_string(),
        descriptors: strings(descriptors),
        context_markers: strings(context_markers),
    }
}

fn relevance(pairs: Vec<(&str, Vec<&str>)>) -> BTreeMap<String, Vec<String>> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), strings(&v)))
        .collect()
}

fn topic(name: &str, keywords: &[&str], weight: f32) -> TopicRule {
    TopicRule {
        name: name.to_string(),
        keywords: strings(keywords),
        weight,
    }
}

fn style(name: &str, patterns: &[&str], weight: f32) -> StyleRule {
    StyleRule {
        name: name.to_string(),
        patterns: strings(patterns),
        weight,
    }
}

impl Default for ClassifierRules {
    fn default() -> Self {
        let categories = vec![
            category(
                "emotional_expression",
                &[
                    "i feel", "feeling", "emotion", "heart", "overwhelmed", "happy", "sad",
                    "angry", "excited", "afraid",
                ],
                &["today", "lately", "right now", "these days", "always", "never"],
            ),
            category(
                "interpersonal",
                &[
                    "friend", "partner", "relationship", "together", "conversation", "argument",
                    "family", "trust", "boyfriend", "girlfriend",
                ],
                &["with", "between", "each other", "said", "told me"],
            ),
            category(
                "analytical",
                &[
                    "because", "therefore", "analysis", "evidence", "reason", "compare", "logic",
                    "data", "conclusion", "however",
                ],
                &["first", "second", "finally", "in summary", "on the other hand"],
            ),
            category(
                "narrative",
                &[
                    "yesterday", "happened", "then", "after that", "story", "remember", "once",
                    "went", "when i was", "last",
                ],
                &["ago", "later", "suddenly", "before", "after"],
            ),
            category(
                "professional",
                &[
                    "work", "job", "project", "meeting", "deadline", "career", "manager", "team",
                    "client", "office",
                ],
                &["schedule", "deliverable", "colleague", "boss", "company"],
            ),
            category(
                "creative",
                &[
                    "imagine", "idea", "art", "music", "write", "design", "dream", "create",
                    "story", "poem",
                ],
                &["inspired", "vision", "style", "color", "sound"],
            ),
        ];

        let topics = vec![
            topic(
                "relationships",
                &["love", "partner", "dating", "friend", "relationship", "trust", "breakup", "marriage"],
                1.0,
            ),
            topic(
                "work",
                &["work", "job", "boss", "career", "salary", "office", "colleague", "project"],
                0.9,
            ),
            topic(
                "health",
                &["health", "sleep", "doctor", "exercise", "tired", "sick", "diet", "therapy"],
                1.0,
            ),
            topic(
                "family",
                &["mom", "dad", "mother", "father", "sister", "brother", "parents", "kids"],
                0.9,
            ),
            topic(
                "emotions",
                &["happy", "sad", "angry", "anxious", "lonely", "excited", "afraid", "calm"],
                1.0,
            ),
            topic(
                "leisure",
                &["game", "movie", "music", "travel", "book", "hobby", "weekend", "party"],
                0.7,
            ),
            topic(
                "self_growth",
                &["goal", "learn", "improve", "habit", "growth", "progress", "change", "future"],
                0.8,
            ),
        ];

        let styles = vec![
            style(
                "formal",
                &[
                    r"\b(therefore|furthermore|moreover|regarding|consequently)\b",
                    r"\b(shall|whom|hence|thus)\b",
                ],
                1.0,
            ),
            style(
                "informal",
                &[r"\b(lol|gonna|wanna|yeah|hey|omg|kinda|gotta)\b", r"!{2,}"],
                1.0,
            ),
            style("emotional", &[r"!", r"\b(love|hate|so much|really|totally)\b"], 0.8),
            style("questioning", &[r"\?", r"\b(why|how|what if|wonder)\b"], 0.8),
            style(
                "assertive",
                &[r"\b(must|need to|have to|will|definitely|always|never)\b"],
                0.7,
            ),
            style("first_person", &[r"\b(i|me|my|myself)\b"], 0.5),
        ];

        let category_topics = relevance(vec![
            ("emotional_expression", vec!["emotions", "relationships", "health"]),
            ("interpersonal", vec!["relationships", "family"]),
            ("analytical", vec!["work", "self_growth"]),
            ("narrative", vec!["family", "leisure"]),
            ("professional", vec!["work"]),
            ("creative", vec!["leisure", "self_growth"]),
        ]);

        let category_styles = relevance(vec![
            ("emotional_expression", vec!["emotional", "first_person"]),
            ("interpersonal", vec!["emotional", "questioning"]),
            ("analytical", vec!["formal", "questioning"]),
            ("narrative", vec!["first_person", "informal"]),
            ("professional", vec!["formal", "assertive"]),
            ("creative", vec!["emotional", "informal"]),
        ]);

        Self {
            categories,
            topics,
            styles,
            category_topics,
            category_styles,
        }
    }
}

impl ClassifierRules {
    pub fn from_json_str(json: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// `classifier.json` from `dir` when present, otherwise the built-in tables.
    pub fn load_or_default(dir: Option<&Path>) -> Result<Self, AppError> {
        match dir.map(|d| d.join(RULES_FILE)).filter(|p| p.is_file()) {
            Some(path) => {
                info!("Loading classifier rules from {}", path.display());
                Self::from_json_file(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Checks names, weights and relevance references, then compiles every pattern.
    pub fn compile(&self) -> Result<CompiledRules, AppError> {
        if self.categories.is_empty() {
            return Err(AppError::Validation(
                "Classifier rules need at least one category".to_string(),
            ));
        }

        let category_names = unique_names(self.categories.iter().map(|c| c.name.as_str()), "category")?;
        let topic_names = unique_names(self.topics.iter().map(|t| t.name.as_str()), "topic")?;
        let style_names = unique_names(self.styles.iter().map(|s| s.name.as_str()), "style")?;

        for rule in &self.topics {
            if !(0.0..=1.0).contains(&rule.weight) {
                return Err(AppError::Validation(format!(
                    "Topic '{}' weight {} is outside [0, 1]",
                    rule.name, rule.weight
                )));
            }
        }
        for rule in &self.styles {
            if !rule.weight.is_finite() || rule.weight < 0.0 {
                return Err(AppError::Validation(format!(
                    "Style '{}' weight {} must be a non-negative number",
                    rule.name, rule.weight
                )));
            }
        }

        check_relevance(&self.category_topics, &category_names, &topic_names, "topic")?;
        check_relevance(&self.category_styles, &category_names, &style_names, "style")?;

        let styles = self
            .styles
            .iter()
            .map(|rule| {
                let patterns = rule
                    .patterns
                    .iter()
                    .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
                    .collect::<Result<Vec<Regex>, _>>()?;
                Ok(CompiledStyle {
                    name: rule.name.clone(),
                    patterns,
                    weight: rule.weight,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        let categories = self
            .categories
            .iter()
            .map(|rule| CompiledCategory {
                name: rule.name.clone(),
                descriptors: normalized_phrases(&rule.descriptors),
                context_markers: normalized_phrases(&rule.context_markers),
            })
            .collect();

        let topics = self
            .topics
            .iter()
            .map(|rule| CompiledTopic {
                name: rule.name.clone(),
                keywords: normalized_phrases(&rule.keywords),
                weight: rule.weight,
            })
            .collect();

        Ok(CompiledRules {
            categories,
            topics,
            styles,
            category_topics: self.category_topics.clone(),
            category_styles: self.category_styles.clone(),
        })
    }
}

fn unique_names<'a>(
    names: impl Iterator<Item = &'a str>,
    kind: &str,
) -> Result<HashSet<&'a str>, AppError> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(AppError::Validation(format!("Empty {} name", kind)));
        }
        if !seen.insert(name) {
            return Err(AppError::Validation(format!("Duplicate {} '{}'", kind, name)));
        }
    }
    Ok(seen)
}

fn check_relevance(
    map: &BTreeMap<String, Vec<String>>,
    categories: &HashSet<&str>,
    targets: &HashSet<&str>,
    kind: &str,
) -> Result<(), AppError> {
    for (category, names) in map {
        if !categories.contains(category.as_str()) {
            return Err(AppError::Validation(format!(
                "Relevance map references unknown category '{}'",
                category
            )));
        }
        if let Some(missing) = names.iter().find(|n| !targets.contains(n.as_str())) {
            return Err(AppError::Validation(format!(
                "Category '{}' references unknown {} '{}'",
                category, kind, missing
            )));
        }
    }
    Ok(())
}

fn normalized_phrases(phrases: &[String]) -> Vec<String> {
    phrases
        .iter()
        .map(|p| normalize(p))
        .filter(|p| !p.is_empty())
        .collect()
}

pub(crate) struct CompiledCategory {
    pub name: String,
    pub descriptors: Vec<String>,
    pub context_markers: Vec<String>,
}

pub(crate) struct CompiledTopic {
    pub name: String,
    pub keywords: Vec<String>,
    pub weight: f32,
}

pub(crate) struct CompiledStyle {
    pub name: String,
    pub patterns: Vec<Regex>,
    pub weight: f32,
}

/// Rule set ready for scoring: phrases normalized, regexes compiled.
pub struct CompiledRules {
    pub(crate) categories: Vec<CompiledCategory>,
    pub(crate) topics: Vec<CompiledTopic>,
    pub(crate) styles: Vec<CompiledStyle>,
    pub(crate) category_topics: BTreeMap<String, Vec<String>>,
    pub(crate) category_styles: BTreeMap<String, Vec<String>>,
}
