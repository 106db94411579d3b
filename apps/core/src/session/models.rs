//! HTTP payloads exchanged with the analysis backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationError};

use crate::parser::Conversation;

pub const DEFAULT_ANALYSIS_TYPE: &str = "comprehensive";

fn default_analysis_type() -> String {
    DEFAULT_ANALYSIS_TYPE.to_string()
}

/// Body of `POST /api/analyze`. Either `text` or `conversations` must be given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_has_input"))]
pub struct AnalyzeRequest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[validate(length(min = 1))]
    #[serde(default = "default_analysis_type")]
    pub analysis_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[validate(nested)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conversations: Vec<Conversation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_speakers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_description: Option<String>,
}

fn validate_has_input(request: &AnalyzeRequest) -> Result<(), ValidationError> {
    if request.text.trim().is_empty() && request.conversations.is_empty() {
        let mut err = ValidationError::new("missing_input");
        err.message = Some("Text or conversations are required".into());
        return Err(err);
    }
    Ok(())
}

impl Default for AnalyzeRequest {
    fn default() -> Self {
        Self {
            text: String::new(),
            analysis_type: default_analysis_type(),
            model: None,
            conversations: Vec::new(),
            selected_speakers: None,
            relationship_description: None,
        }
    }
}

impl AnalyzeRequest {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn from_conversations(conversations: Vec<Conversation>) -> Self {
        Self {
            conversations,
            ..Self::default()
        }
    }

    pub fn with_analysis_type(mut self, analysis_type: impl Into<String>) -> Self {
        self.analysis_type = analysis_type.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Reply to `POST /api/analyze`.
///
/// An asynchronous start carries a `session_id`; anything else is the final
/// result delivered synchronously. `status` stays in `body`, since a
/// synchronous result may give it any shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub body: serde_json::Map<String, Value>,
}

impl AnalyzeResponse {
    /// Session id of an asynchronous start, ignoring blank ids.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Top-level `status`, when the backend sent it as a string.
    pub fn status(&self) -> Option<&str> {
        self.body.get("status").and_then(Value::as_str)
    }

    /// The response as one JSON value, for synchronous results.
    pub fn into_value(self) -> Value {
        let mut body = self.body;
        if let Some(session_id) = self.session_id {
            body.insert("session_id".to_string(), Value::String(session_id));
        }
        Value::Object(body)
    }
}

/// Generic `{status, message}` acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// `GET /api/models`. The backend reports upstream failures inline in `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsResponse {
    #[serde(default)]
    pub data: Vec<ModelInfo>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `POST /api/parse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResponse {
    pub status: String,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub speakers: Vec<String>,
}

/// `POST /api/validate_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValidation {
    pub valid: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `POST /api/resolve_intervention`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct InterventionAnswer {
    #[validate(length(min = 1))]
    pub session_id: String,
    #[validate(length(min = 1))]
    pub answer: String,
}
