//! Risk assessment records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::resources::Resource;

/// Session id used when the caller does not supply one.
pub const DEFAULT_SESSION_ID: &str = "default-session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Crisis,
}

impl RiskLevel {
    /// Maps an overall concern severity onto a level. CRISIS is never produced
    /// here; it only comes from a crisis trigger.
    pub fn from_severity(severity: f32) -> Self {
        if severity >= 0.8 {
            RiskLevel::High
        } else if severity >= 0.6 {
            RiskLevel::Medium
        } else if severity >= 0.3 {
            RiskLevel::Low
        } else {
            RiskLevel::None
        }
    }

    pub fn requires_intervention(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Crisis)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::None => "NONE",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Crisis => "CRISIS",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A crisis pattern hit that fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    /// Crisis family name (e.g. `suicidal_intent`).
    pub kind: String,
    pub matched_text: String,
    pub severity: f32,
    pub confidence: f32,
}

/// A concern family that matched at least one pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concern {
    pub kind: String,
    pub matched_phrases: Vec<String>,
    /// Fraction of the family's patterns that matched.
    pub severity: f32,
}

/// Caller-supplied context for an assessment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentContext {
    #[serde(default)]
    pub session_id: Option<String>,
    /// Where the text came from (`analysis_form`, `chat`, ...).
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub speaker: Option<String>,
}

impl AssessmentContext {
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn session_key(&self) -> &str {
        self.session_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_SESSION_ID)
    }
}

/// Diagnostic detail about how a level was reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentMetadata {
    pub has_excluding_context: bool,
    pub excluding_contexts: Vec<String>,
    pub severity_threshold: f32,
    /// Crisis matches that the excluding context held back.
    pub suppressed_matches: usize,
    pub crisis_detected: bool,
    /// Mean severity of matched concerns (0 when a crisis short-circuited).
    pub overall_severity: f32,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: String,
    pub content: String,
    pub context: AssessmentContext,
    pub risk_level: RiskLevel,
    pub triggers: Vec<Trigger>,
    pub concerns: Vec<Concern>,
    pub requires_intervention: bool,
    pub resources: Vec<Resource>,
    pub session_id: String,
    pub metadata: AssessmentMetadata,
    pub created_at: DateTime<Utc>,
}

impl RiskAssessment {
    pub fn has_concern(&self, kind: &str) -> bool {
        self.concerns.iter().any(|c| c.kind == kind)
    }

    pub fn summary(&self) -> String {
        format!(
            "Risk: {}, Triggers: {}, Concerns: [{}], Intervention: {}",
            self.risk_level,
            self.triggers.len(),
            self.concerns
                .iter()
                .map(|c| c.kind.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            if self.requires_intervention { "yes" } else { "no" }
        )
    }
}
