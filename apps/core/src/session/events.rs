//! Event-channel wire format: `{"event": "<name>", "data": {...}}` frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub session_id: String,
    /// 0 to 100.
    #[serde(default)]
    pub progress: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ProgressUpdate {
    pub fn percent(&self) -> f32 {
        if self.progress.is_finite() {
            self.progress.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    /// First of `message`, `current_step`, `status` that is present and non-blank.
    pub fn status_text(&self) -> Option<&str> {
        [&self.message, &self.current_step, &self.status]
            .into_iter()
            .filter_map(|s| s.as_deref())
            .find(|s| !s.trim().is_empty())
    }
}

/// Events pushed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum AnalysisEvent {
    #[serde(rename = "analysis_progress")]
    Progress(ProgressUpdate),
    #[serde(rename = "analysis_complete")]
    Complete {
        session_id: String,
        #[serde(default)]
        results: Value,
    },
    #[serde(rename = "analysis_error")]
    Error {
        session_id: String,
        #[serde(default)]
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
    #[serde(rename = "analysis_intervention")]
    Intervention {
        session_id: String,
        #[serde(default)]
        intervention: Value,
    },
    #[serde(rename = "intervention_failed")]
    InterventionFailed {
        session_id: String,
        #[serde(default)]
        message: String,
    },
}

impl AnalysisEvent {
    pub fn session_id(&self) -> &str {
        match self {
            AnalysisEvent::Progress(update) => &update.session_id,
            AnalysisEvent::Complete { session_id, .. }
            | AnalysisEvent::Error { session_id, .. }
            | AnalysisEvent::Intervention { session_id, .. }
            | AnalysisEvent::InterventionFailed { session_id, .. } => session_id,
        }
    }

    /// Completion and error end a session; everything else is informational.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisEvent::Complete { .. } | AnalysisEvent::Error { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            AnalysisEvent::Progress(_) => "analysis_progress",
            AnalysisEvent::Complete { .. } => "analysis_complete",
            AnalysisEvent::Error { .. } => "analysis_error",
            AnalysisEvent::Intervention { .. } => "analysis_intervention",
            AnalysisEvent::InterventionFailed { .. } => "intervention_failed",
        }
    }
}

/// Frames the client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientCommand {
    #[serde(rename = "join_analysis")]
    Join { session_id: String },
    #[serde(rename = "leave_analysis")]
    Leave { session_id: String },
}
