//! Risk Assessor Tests
//!
//! Properties of the two-phase assessment over the built-in pattern tables
//! and over rule sets loaded from disk.

use crate::error::AppError;
use crate::risk::{
    AssessmentContext, CrisisFamily, PatternFamily, ResourceKind, RiskAssessor, RiskLevel,
    RiskRules,
};
use tempfile::tempdir;

fn assess(assessor: &RiskAssessor, text: &str) -> crate::risk::RiskAssessment {
    assessor
        .assess(text, &AssessmentContext::default())
        .expect("assessment should succeed")
}

/// One exclusion context ("hypothetically") and one crisis family per severity.
fn graded_rules(excluded_threshold: f32, severities: &[f32]) -> RiskRules {
    RiskRules {
        exclusion_contexts: vec![PatternFamily {
            name: "hypothetical".to_string(),
            patterns: vec![r"\bhypothetically\b".to_string()],
        }],
        crisis_families: severities
            .iter()
            .enumerate()
            .map(|(i, severity)| CrisisFamily {
                name: format!("level_{}", i),
                severity: *severity,
                patterns: vec![format!(r"\bmarker{}\b", i)],
            })
            .collect(),
        concern_families: Vec::new(),
        excluded_context_threshold: excluded_threshold,
        ..RiskRules::default()
    }
}

// ============================================================================
// Crisis Detection Tests
// ============================================================================

#[cfg(test)]
mod crisis_tests {
    use super::*;

    #[test]
    fn test_direct_statements_are_crisis() {
        let assessor = RiskAssessor::new();
        for text in [
            "I want to kill myself",
            "i'm going to end my life tonight",
            "I don't want to live anymore",
            "I am going to hurt myself",
        ] {
            let result = assess(&assessor, text);
            assert_eq!(result.risk_level, RiskLevel::Crisis, "{}", text);
            assert!(result.requires_intervention);
            assert!(result.concerns.is_empty());
            assert!(result.metadata.crisis_detected);
            assert!(result.triggers.iter().all(|t| t.confidence == 0.95));
            assert!(result
                .resources
                .iter()
                .any(|r| r.kind == ResourceKind::Crisis));
        }
    }

    #[test]
    fn test_narratives_do_not_reach_crisis() {
        let assessor = RiskAssessor::new();
        for text in [
            "My father died of heart failure at the hospital last year.",
            "We were discussing suicide awareness in our support group.",
            "The doctor changed the treatment plan for my mother.",
            "My dad passed away last year after his cancer treatment, talking about it openly",
        ] {
            let result = assess(&assessor, text);
            assert_ne!(result.risk_level, RiskLevel::Crisis, "{}", text);
            assert!(result.metadata.has_excluding_context, "{}", text);
            assert_eq!(result.metadata.severity_threshold, 0.9);
        }
    }

    #[test]
    fn test_full_severity_ignores_excluding_context() {
        let assessor = RiskAssessor::new();
        let result = assess(
            &assessor,
            "Since my diagnosis last year I have made a plan to kill myself",
        );

        assert!(result.metadata.has_excluding_context);
        assert_eq!(result.risk_level, RiskLevel::Crisis);
        assert!(result.triggers.iter().any(|t| t.kind == "self_harm"));
        assert!(result.triggers.iter().all(|t| t.severity == 1.0));
    }

    #[test]
    fn test_trolling_without_context() {
        let assessor = RiskAssessor::new();
        let result = assess(&assessor, "just testing, can I bypass the filter?");
        assert_eq!(result.risk_level, RiskLevel::Crisis);
        assert!(result.triggers.iter().all(|t| t.kind == "trolling"));
        assert_eq!(result.metadata.severity_threshold, 0.7);
    }
}

// ============================================================================
// Threshold Tests
// ============================================================================

#[cfg(test)]
mod threshold_tests {
    use super::*;

    #[test]
    fn test_trigger_iff_severity_reaches_threshold() {
        let severities = [0.5, 0.85, 0.9, 1.0];
        let assessor = RiskAssessor::with_rules(&graded_rules(0.9, &severities)).unwrap();
        let text = "hypothetically marker0 marker1 marker2 marker3";

        let result = assess(&assessor, text);
        let kinds: Vec<&str> = result.triggers.iter().map(|t| t.kind.as_str()).collect();
        assert_eq!(kinds, vec!["level_2", "level_3"]);
        assert_eq!(result.metadata.suppressed_matches, 2);

        // Without the exclusion context every match fires.
        let result = assess(&assessor, "marker0 marker1 marker2 marker3");
        assert_eq!(result.triggers.len(), 4);
        assert_eq!(result.metadata.suppressed_matches, 0);
    }

    #[test]
    fn test_raising_threshold_never_adds_triggers() {
        let severities = [0.1, 0.3, 0.5, 0.7, 0.9, 1.0];
        let text = "hypothetically marker0 marker1 marker2 marker3 marker4 marker5";

        let mut previous = usize::MAX;
        for threshold in [0.0, 0.2, 0.4, 0.6, 0.8, 1.0] {
            let assessor = RiskAssessor::with_rules(&graded_rules(threshold, &severities)).unwrap();
            let result = assess(&assessor, text);
            assert!(result.triggers.len() <= previous, "threshold {}", threshold);
            assert!(result.triggers.iter().all(|t| t.severity >= threshold));
            previous = result.triggers.len();
        }
        assert_eq!(previous, 1);
    }

    #[test]
    fn test_level_boundaries() {
        assert_eq!(RiskLevel::from_severity(0.9), RiskLevel::High);
        assert_eq!(RiskLevel::from_severity(0.8), RiskLevel::High);
        assert_eq!(RiskLevel::from_severity(0.65), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_severity(0.35), RiskLevel::Low);
        assert_eq!(RiskLevel::from_severity(0.0), RiskLevel::None);

        let mut previous = RiskLevel::None;
        for step in 0..=100 {
            let level = RiskLevel::from_severity(step as f32 / 100.0);
            assert!(level >= previous);
            previous = level;
        }
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let rules = graded_rules(1.5, &[1.0]);
        assert!(matches!(
            RiskAssessor::with_rules(&rules),
            Err(AppError::Validation(_))
        ));
    }
}

// ============================================================================
// Concern Tests
// ============================================================================

#[cfg(test)]
mod concern_tests {
    use super::*;

    #[test]
    fn test_level_follows_mean_concern_severity() {
        let assessor = RiskAssessor::new();

        let result = assess(&assessor, "I feel anxious and lonely");
        let kinds: Vec<&str> = result.concerns.iter().map(|c| c.kind.as_str()).collect();
        assert_eq!(kinds, vec!["anxiety", "isolation"]);
        // anxiety 1/5, isolation 1/4
        assert!((result.metadata.overall_severity - 0.225).abs() < 1e-5);
        assert_eq!(result.risk_level, RiskLevel::None);
        assert!(!result.requires_intervention);
        assert!(result
            .resources
            .iter()
            .any(|r| r.kind == ResourceKind::Professional));
    }

    #[test]
    fn test_neutral_text_is_none() {
        let assessor = RiskAssessor::new();
        let result = assess(&assessor, "We went hiking and had a picnic by the lake.");
        assert_eq!(result.risk_level, RiskLevel::None);
        assert!(result.triggers.is_empty());
        assert!(result.concerns.is_empty());
        assert!(result
            .resources
            .iter()
            .all(|r| r.kind == ResourceKind::SelfHelp));
    }

    #[test]
    fn test_history_is_per_session() {
        let assessor = RiskAssessor::new();
        let a = AssessmentContext::for_session("a");
        let b = AssessmentContext::for_session("b");

        assessor.assess("I feel sad", &a).unwrap();
        assessor.assess("I feel lonely", &a).unwrap();
        assessor.assess("Hello", &b).unwrap();

        assert_eq!(assessor.history("a").len(), 2);
        assert_eq!(assessor.history("b").len(), 1);
        assert_eq!(assessor.active_sessions(), vec!["a", "b"]);
    }
}

// ============================================================================
// Rule Loading Tests
// ============================================================================

#[cfg(test)]
mod rule_loading_tests {
    use super::*;

    #[test]
    fn test_rules_from_directory() {
        let dir = tempdir().unwrap();
        assert_eq!(
            RiskRules::load_or_default(Some(dir.path())).unwrap(),
            RiskRules::default()
        );

        let rules = graded_rules(0.9, &[0.6]);
        std::fs::write(
            dir.path().join("risk.json"),
            serde_json::to_string_pretty(&rules).unwrap(),
        )
        .unwrap();

        let loaded = RiskRules::load_or_default(Some(dir.path())).unwrap();
        assert_eq!(loaded, rules);

        let assessor = RiskAssessor::with_rules(&loaded).unwrap();
        assert_eq!(assess(&assessor, "marker0").risk_level, RiskLevel::Crisis);
        assert_eq!(
            assess(&assessor, "hypothetically marker0").risk_level,
            RiskLevel::None
        );
    }

    #[test]
    fn test_thresholds_default_when_omitted() {
        let json = r#"{
            "exclusion_contexts": [],
            "crisis_families": [{"name": "x", "severity": 1.0, "patterns": ["\\bxyzzy\\b"]}],
            "concern_families": []
        }"#;
        let rules = RiskRules::from_json_str(json).unwrap();
        assert_eq!(rules.excluded_context_threshold, 0.9);
        assert_eq!(rules.default_threshold, 0.7);
        assert!(!rules.resources.self_help.is_empty());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut rules = RiskRules::default();
        rules.concern_families[0].patterns.push("(unclosed".to_string());
        assert!(matches!(
            RiskAssessor::with_rules(&rules),
            Err(AppError::Validation(_))
        ));
    }
}
