//! Pattern families for the risk assessor.
//!
//! Every family is data: a name, a list of regexes and (for crisis families) a
//! fixed severity. All patterns are matched case-insensitively against the raw
//! content.

use crate::error::AppError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::resources::ResourceCatalog;

/// File name looked up inside the rules directory.
pub const RULES_FILE: &str = "risk.json";
/// Severity at or above which a crisis match fires even inside an excluding context.
pub const EXCLUDED_CONTEXT_THRESHOLD: f32 = 0.9;
/// Threshold applied when no excluding context was found.
pub const DEFAULT_THRESHOLD: f32 = 0.7;
/// Confidence attached to every crisis pattern hit.
pub const PATTERN_CONFIDENCE: f32 = 0.95;

/// A named group of regexes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternFamily {
    pub name: String,
    pub patterns: Vec<String>,
}

/// A crisis family with the severity its matches carry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrisisFamily {
    pub name: String,
    /// In [0, 1].
    pub severity: f32,
    pub patterns: Vec<String>,
}

/// All tables the risk assessor runs on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskRules {
    /// Medical, third-person, past-tense and educational framing.
    pub exclusion_contexts: Vec<PatternFamily>,
    pub crisis_families: Vec<CrisisFamily>,
    pub concern_families: Vec<PatternFamily>,
    #[serde(default = "default_excluded_threshold")]
    pub excluded_context_threshold: f32,
    #[serde(default = "default_threshold")]
    pub default_threshold: f32,
    #[serde(default)]
    pub resources: ResourceCatalog,
}

fn default_excluded_threshold() -> f32 {
    EXCLUDED_CONTEXT_THRESHOLD
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn family(name: &str, patterns: &[&str]) -> PatternFamily {
    PatternFamily {
        name: name.to_string(),
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
    }
}

fn crisis(name: &str, severity: f32, patterns: &[&str]) -> CrisisFamily {
    CrisisFamily {
        name: name.to_string(),
        severity,
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
    }
}

impl Default for RiskRules {
    fn default() -> Self {
        let exclusion_contexts = vec![
            family(
                "medical_discussion",
                &[r"\b(doctor|medical|treatment|hospital|cancer|heart failure|medication|prescription|diagnosis|illness|disease|therapy)\b"],
            ),
            family(
                "third_person_discussion",
                &[r"\b(my (friend|family|dad|mom|father|mother|brother|sister|relative)|he (died|passed)|she (died|passed)|family member|someone I know)\b"],
            ),
            family(
                "past_events",
                &[r"\b(last (year|month|week)|months? ago|years? ago|(car )?accident happened|previously|in the past|used to|had been)\b"],
            ),
            family(
                "educational_context",
                &[r"\b(discussing|awareness|helping others|support group|learning about|understanding|information about)\b"],
            ),
        ];

        let crisis_families = vec![
            crisis(
                "trolling",
                0.8,
                &[
                    r"\b(just|only) (testing|trolling)\b",
                    r"\b(bypass|trick|break|test) (the|your) (filter|safety|system|moderation)\b",
                    r"\b(jailbreak|prompt injection)\b",
                ],
            ),
            crisis(
                "suicidal_intent",
                1.0,
                &[
                    r"\bI(?:'m| am)? (?:want to|going to|gonna|plan(?:ning)? to|will|about to) (?:kill myself|end my life|commit suicide|take my (?:own )?life)\b",
                    r"\bI (?:don't|do not) want to (?:live|be alive) anymore\b",
                    r"\bI(?:'m| am) (?:ready|planning) to die\b",
                ],
            ),
            crisis(
                "self_harm",
                1.0,
                &[
                    r"\bI(?:'m| am)? (?:want to|going to|gonna|plan(?:ning)? to|will) (?:hurt|harm|cut|burn) myself\b",
                    r"\bI(?: have|'ve| am making) (?:made )?(?:a plan|plans) to (?:hurt|kill|harm) myself\b",
                ],
            ),
            crisis(
                "overdose",
                1.0,
                &[
                    r"\bI(?:'m| am)? (?:want to|going to|gonna|plan(?:ning)? to|will) (?:overdose|take all (?:of )?my (?:pills|meds|medication))\b",
                    r"\bI(?:'m| am) (?:taking|swallowing) all (?:of )?(?:my|the) (?:pills|meds|medication)\b",
                ],
            ),
            crisis(
                "violent_threat",
                1.0,
                &[
                    r"\bI(?:'m| am)? (?:planning|going|gonna|plan|want|intend) (?:to )?(?:attack|murder|shoot|stab|hurt|kill|harm) (?:someone|people|him|her|them|others|everyone)\b",
                ],
            ),
            crisis(
                "illegal_content",
                1.0,
                &[
                    r"\b(?:child (?:porn|pornography|sexual abuse material)|csam)\b",
                    r"\b(?:buy|sell|selling|buying) (?:a )?(?:gun|weapon|firearm)s? (?:illegally|without a license)\b",
                    r"\bhow (?:do I|to) (?:make|build) (?:a )?(?:bomb|explosive)s?\b",
                ],
            ),
        ];

        let concern_families = vec![
            family(
                "depression",
                &[
                    r"\bhopeless(?:ness)?\b",
                    r"\bworthless\b",
                    r"\bnothing matters\b",
                    r"\bfeel(?:ing)? (?:so |very |really )?(?:sad|down|empty|numb|hopeless|worthless)\b",
                    r"\b(?:no|what'?s the) point\b",
                    r"\b(?:can'?t|cannot) (?:go on|keep going|take (?:it|this) anymore)\b",
                ],
            ),
            family(
                "anxiety",
                &[
                    r"\b(?:anxious|anxiety)\b",
                    r"\bpanic(?: attacks?)?\b",
                    r"\b(?:constantly|always) (?:worried|worrying|nervous|on edge)\b",
                    r"\bcan'?t (?:stop worrying|breathe|calm down)\b",
                    r"\b(?:overthinking|racing thoughts)\b",
                ],
            ),
            family(
                "isolation",
                &[
                    r"\b(?:alone|lonely)\b",
                    r"\bno ?one (?:cares|understands|listens)\b",
                    r"\b(?:no|don'?t have any) friends\b",
                    r"\b(?:isolated|cut off from everyone)\b",
                ],
            ),
        ];

        Self {
            exclusion_contexts,
            crisis_families,
            concern_families,
            excluded_context_threshold: EXCLUDED_CONTEXT_THRESHOLD,
            default_threshold: DEFAULT_THRESHOLD,
            resources: ResourceCatalog::default(),
        }
    }
}

impl RiskRules {
    pub fn from_json_str(json: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// `risk.json` from `dir` when present, otherwise the built-in tables.
    pub fn load_or_default(dir: Option<&Path>) -> Result<Self, AppError> {
        match dir.map(|d| d.join(RULES_FILE)).filter(|p| p.is_file()) {
            Some(path) => {
                info!("Loading risk rules from {}", path.display());
                Self::from_json_file(&path)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn compile(&self) -> Result<CompiledRiskRules, AppError> {
        for threshold in [self.excluded_context_threshold, self.default_threshold] {
            check_unit("threshold", threshold)?;
        }

        let exclusion_contexts = self
            .exclusion_contexts
            .iter()
            .map(compile_family)
            .collect::<Result<Vec<_>, _>>()?;
        let concern_families = self
            .concern_families
            .iter()
            .map(compile_family)
            .collect::<Result<Vec<_>, _>>()?;
        let crisis_families = self
            .crisis_families
            .iter()
            .map(|f| {
                check_unit(&format!("severity of '{}'", f.name), f.severity)?;
                Ok(CompiledCrisisFamily {
                    name: f.name.clone(),
                    severity: f.severity,
                    patterns: compile_patterns(&f.patterns)?,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(CompiledRiskRules {
            exclusion_contexts,
            crisis_families,
            concern_families,
            excluded_context_threshold: self.excluded_context_threshold,
            default_threshold: self.default_threshold,
            resources: self.resources.clone(),
        })
    }
}

fn check_unit(what: &str, value: f32) -> Result<(), AppError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Risk rule {} must be within [0, 1], got {}",
            what, value
        )))
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, AppError> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(AppError::from)
        })
        .collect()
}

fn compile_family(family: &PatternFamily) -> Result<CompiledFamily, AppError> {
    if family.patterns.is_empty() {
        return Err(AppError::Validation(format!(
            "Pattern family '{}' has no patterns",
            family.name
        )));
    }
    Ok(CompiledFamily {
        name: family.name.clone(),
        patterns: compile_patterns(&family.patterns)?,
    })
}

pub(crate) struct CompiledFamily {
    pub name: String,
    pub patterns: Vec<Regex>,
}

impl CompiledFamily {
    /// Text of the first match of every pattern that matches.
    pub fn matches<'t>(&self, content: &'t str) -> Vec<&'t str> {
        self.patterns
            .iter()
            .filter_map(|p| p.find(content).map(|m| m.as_str()))
            .collect()
    }
}

pub(crate) struct CompiledCrisisFamily {
    pub name: String,
    pub severity: f32,
    pub patterns: Vec<Regex>,
}

pub struct CompiledRiskRules {
    pub(crate) exclusion_contexts: Vec<CompiledFamily>,
    pub(crate) crisis_families: Vec<CompiledCrisisFamily>,
    pub(crate) concern_families: Vec<CompiledFamily>,
    pub(crate) excluded_context_threshold: f32,
    pub(crate) default_threshold: f32,
    pub(crate) resources: ResourceCatalog,
}
