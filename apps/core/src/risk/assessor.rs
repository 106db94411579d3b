//! Two-phase risk assessment: crisis check, then concern analysis.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::assessment::{
    AssessmentContext, AssessmentMetadata, Concern, RiskAssessment, RiskLevel, Trigger,
};
use super::patterns::{CompiledRiskRules, RiskRules, PATTERN_CONFIDENCE};
use crate::error::AppError;

#[derive(Default)]
struct AssessorState {
    history: HashMap<String, Vec<RiskAssessment>>,
    active_sessions: HashSet<String>,
}

/// Outcome of the crisis phase.
struct CrisisCheck {
    excluding_contexts: Vec<String>,
    threshold: f32,
    triggers: Vec<Trigger>,
    suppressed: usize,
}

/// Assesses content for crisis signals and softer concerns, keeping a
/// per-session history of every assessment it produced.
pub struct RiskAssessor {
    rules: CompiledRiskRules,
    state: Mutex<AssessorState>,
}

impl Default for RiskAssessor {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskAssessor {
    pub fn new() -> Self {
        let rules = RiskRules::default()
            .compile()
            .expect("Built-in risk rules must compile");
        Self::from_compiled(rules)
    }

    pub fn with_rules(rules: &RiskRules) -> Result<Self, AppError> {
        Ok(Self::from_compiled(rules.compile()?))
    }

    fn from_compiled(rules: CompiledRiskRules) -> Self {
        Self {
            rules,
            state: Mutex::new(AssessorState::default()),
        }
    }

    /// Assess `content`. Internal failures are logged and reported as a
    /// generic [`AppError::Assessment`].
    pub fn assess(
        &self,
        content: &str,
        context: &AssessmentContext,
    ) -> Result<RiskAssessment, AppError> {
        self.try_assess(content, context).map_err(|e| {
            error!(
                session_id = context.session_key(),
                "Risk assessment failed: {}", e
            );
            AppError::Assessment("Risk assessment failed".to_string())
        })
    }

    fn try_assess(
        &self,
        content: &str,
        context: &AssessmentContext,
    ) -> Result<RiskAssessment, AppError> {
        let started = Instant::now();
        let session_id = context.session_key().to_string();

        let crisis = self.check_crisis(content);
        let crisis_detected = !crisis.triggers.is_empty();

        let (risk_level, concerns, overall_severity) = if crisis_detected {
            warn!(
                session_id = %session_id,
                triggers = crisis.triggers.len(),
                "Crisis content detected"
            );
            (RiskLevel::Crisis, Vec::new(), 0.0)
        } else {
            let concerns = self.analyze_concerns(content);
            let overall = if concerns.is_empty() {
                0.0
            } else {
                concerns.iter().map(|c| c.severity).sum::<f32>() / concerns.len() as f32
            };
            (RiskLevel::from_severity(overall), concerns, overall)
        };

        let resources = self
            .rules
            .resources
            .recommend(risk_level, !concerns.is_empty());

        let assessment = RiskAssessment {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            context: context.clone(),
            risk_level,
            requires_intervention: risk_level.requires_intervention(),
            triggers: crisis.triggers,
            concerns,
            resources,
            session_id: session_id.clone(),
            metadata: AssessmentMetadata {
                has_excluding_context: !crisis.excluding_contexts.is_empty(),
                excluding_contexts: crisis.excluding_contexts,
                severity_threshold: crisis.threshold,
                suppressed_matches: crisis.suppressed,
                crisis_detected,
                overall_severity,
                processing_time_ms: started.elapsed().as_millis() as u64,
            },
            created_at: Utc::now(),
        };

        let mut state = self.state()?;
        state.active_sessions.insert(session_id.clone());
        state
            .history
            .entry(session_id)
            .or_default()
            .push(assessment.clone());

        debug!("{}", assessment.summary());
        Ok(assessment)
    }

    fn check_crisis(&self, content: &str) -> CrisisCheck {
        let excluding_contexts: Vec<String> = self
            .rules
            .exclusion_contexts
            .iter()
            .filter(|family| !family.matches(content).is_empty())
            .map(|family| family.name.clone())
            .collect();

        let has_excluding_context = !excluding_contexts.is_empty();
        let threshold = if has_excluding_context {
            self.rules.excluded_context_threshold
        } else {
            self.rules.default_threshold
        };

        let mut triggers = Vec::new();
        let mut suppressed = 0;
        for family in &self.rules.crisis_families {
            for pattern in &family.patterns {
                let Some(found) = pattern.find(content) else {
                    continue;
                };
                if !has_excluding_context || family.severity >= threshold {
                    triggers.push(Trigger {
                        kind: family.name.clone(),
                        matched_text: found.as_str().to_string(),
                        severity: family.severity,
                        confidence: PATTERN_CONFIDENCE,
                    });
                } else {
                    suppressed += 1;
                }
            }
        }

        if suppressed > 0 {
            debug!(
                suppressed,
                contexts = ?excluding_contexts,
                "Crisis matches held back by excluding context"
            );
        }

        CrisisCheck {
            excluding_contexts,
            threshold,
            triggers,
            suppressed,
        }
    }

    fn analyze_concerns(&self, content: &str) -> Vec<Concern> {
        self.rules
            .concern_families
            .iter()
            .filter_map(|family| {
                let matched = family.matches(content);
                if matched.is_empty() {
                    return None;
                }
                Some(Concern {
                    kind: family.name.clone(),
                    severity: matched.len() as f32 / family.patterns.len() as f32,
                    matched_phrases: matched.into_iter().map(str::to_string).collect(),
                })
            })
            .collect()
    }

    fn state(&self) -> Result<MutexGuard<'_, AssessorState>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("Assessor state lock poisoned".to_string()))
    }

    /// Assessments recorded for `session_id`, oldest first.
    pub fn history(&self, session_id: &str) -> Vec<RiskAssessment> {
        self.state()
            .map(|s| s.history.get(session_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn active_sessions(&self) -> Vec<String> {
        let mut sessions: Vec<String> = self
            .state()
            .map(|s| s.active_sessions.iter().cloned().collect())
            .unwrap_or_default();
        sessions.sort();
        sessions
    }

    /// Drops the history for `session_id` and removes it from the active set.
    /// Returns whether anything was recorded for it.
    pub fn clear_session(&self, session_id: &str) -> bool {
        match self.state() {
            Ok(mut state) => {
                let had_history = state.history.remove(session_id).is_some();
                state.active_sessions.remove(session_id) || had_history
            }
            Err(e) => {
                error!("Could not clear session {}: {}", session_id, e);
                false
            }
        }
    }
}
