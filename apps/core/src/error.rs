use std::io;
use thiserror::Error;

/// Crate-wide error type, consolidating every failure the client core can surface.
#[derive(Debug, Error)]
pub enum AppError {
    /// Input rejected before any network call (missing text, malformed rule set, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network failure, HTTP timeout or non-2xx response from the analysis backend.
    ///
    /// `message` is already user-facing: either the server's `{message}` body or a
    /// text derived from the status code.
    #[error("Transport error: {message}")]
    Transport {
        status: Option<u16>,
        retryable: bool,
        message: String,
    },

    /// The risk assessment pipeline failed. Detail is logged, never carried here.
    #[error("Assessment error: {0}")]
    Assessment(String),

    /// The local analysis ceiling elapsed before the backend resolved the session.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// An analysis is already pending on this orchestrator.
    #[error("Analysis already in progress for session {0}")]
    AnalysisInProgress(String),

    /// Configuration-related errors (e.g. a malformed environment variable).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Standard input/output errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Unexpected internal errors that indicate a bug.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Builds a transport error from an HTTP status, keeping the server message if any.
    pub fn from_status(status: u16, server_message: Option<String>) -> Self {
        let message = server_message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| status_message(status).to_string());
        AppError::Transport {
            status: Some(status),
            retryable: is_retryable_status(status),
            message,
        }
    }

    /// Whether the HTTP layer may retry the failed request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transport { retryable: true, .. })
    }

    /// HTTP status carried by a transport error.
    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Message suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::Transport { message, .. } => message.clone(),
            AppError::Assessment(_) => "Risk assessment failed".to_string(),
            AppError::Timeout(msg) => msg.clone(),
            AppError::AnalysisInProgress(_) => {
                "An analysis is already running. Please wait for it to finish.".to_string()
            }
            AppError::Config(_) | AppError::Io(_) | AppError::Internal(_) => {
                "An unexpected error occurred.".to_string()
            }
        }
    }
}

/// 5xx plus request-timeout and rate-limit responses are worth another attempt.
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

/// User-facing text for an HTTP status without a server-provided message.
pub fn status_message(status: u16) -> &'static str {
    match status {
        400 => "Invalid request. Please check your input and try again.",
        401 => "Authentication required. Please check your API key.",
        403 => "Access denied.",
        404 => "The requested resource was not found.",
        408 => "The request timed out. Please try again.",
        413 => "The submitted text is too large.",
        429 => "Too many requests. Please wait a moment and try again.",
        500..=599 => "The analysis server encountered an error. Please try again later.",
        _ => "The request failed.",
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        match self {
            AppError::Validation(s) => AppError::Validation(s.clone()),
            AppError::Transport {
                status,
                retryable,
                message,
            } => AppError::Transport {
                status: *status,
                retryable: *retryable,
                message: message.clone(),
            },
            AppError::Assessment(s) => AppError::Assessment(s.clone()),
            AppError::Timeout(s) => AppError::Timeout(s.clone()),
            AppError::AnalysisInProgress(s) => AppError::AnalysisInProgress(s.clone()),
            AppError::Config(s) => AppError::Config(s.clone()),
            AppError::Io(e) => AppError::Io(io::Error::new(e.kind(), e.to_string())),
            AppError::Internal(s) => AppError::Internal(s.clone()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        AppError::Timeout(format!("Operation timed out: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON error: {}", err))
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::Config(format!("URL parse error: {}", err))
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> Self {
        AppError::Validation(format!("Invalid pattern: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("Validation errors: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return AppError::from_status(status.as_u16(), None);
        }
        let message = if err.is_timeout() {
            "The request timed out. Please try again.".to_string()
        } else {
            "Unable to reach the analysis server. Please check your connection.".to_string()
        };
        AppError::Transport {
            status: None,
            retryable: true,
            message,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::Transport {
            status: None,
            retryable: true,
            message: format!("Event channel error: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(408));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(404));
    }

    #[test]
    fn test_from_status_prefers_server_message() {
        let err = AppError::from_status(400, Some("No conversation data provided".to_string()));
        assert_eq!(err.user_message(), "No conversation data provided");
        assert_eq!(err.status(), Some(400));
        assert!(!err.is_retryable());

        let err = AppError::from_status(502, Some("   ".to_string()));
        assert!(err.is_retryable());
        assert!(err.user_message().contains("server"));
    }

    #[test]
    fn test_assessment_message_is_generic() {
        let err = AppError::Assessment("regex engine exploded at offset 12".to_string());
        assert_eq!(err.user_message(), "Risk assessment failed");
    }
}
