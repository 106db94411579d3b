//! Client configuration, read from the environment (and an optional `.env`).

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
pub const DEFAULT_WS_URL: &str = "ws://localhost:5000/ws";
pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 150;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;

/// Settings shared by the HTTP client, the event channel and the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClientConfig {
    /// Base URL of the analysis backend.
    #[validate(url)]
    pub api_url: String,
    /// WebSocket endpoint carrying progress/completion events.
    #[validate(url)]
    pub ws_url: String,
    /// Local ceiling for a whole analysis, in seconds.
    #[validate(range(min = 1))]
    pub analysis_timeout_secs: u64,
    /// Per-request HTTP timeout, in seconds.
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
    /// Total attempts for a retryable request (first try included).
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,
    /// First retry delay; doubles on each further attempt.
    #[validate(range(min = 1))]
    pub initial_backoff_ms: u64,
    /// Directory with `classifier.json` / `risk.json` overrides.
    pub rules_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            analysis_timeout_secs: DEFAULT_ANALYSIS_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            rules_dir: None,
        }
    }
}

impl ClientConfig {
    /// Reads `PERSONA_*` variables, falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();
        let config = Self {
            api_url: env::var("PERSONA_API_URL").unwrap_or(defaults.api_url),
            ws_url: env::var("PERSONA_WS_URL").unwrap_or(defaults.ws_url),
            analysis_timeout_secs: parse_var(
                "PERSONA_ANALYSIS_TIMEOUT_SECS",
                defaults.analysis_timeout_secs,
            )?,
            request_timeout_secs: parse_var(
                "PERSONA_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            max_attempts: parse_var("PERSONA_MAX_ATTEMPTS", defaults.max_attempts)?,
            initial_backoff_ms: parse_var(
                "PERSONA_INITIAL_BACKOFF_MS",
                defaults.initial_backoff_ms,
            )?,
            rules_dir: env::var("PERSONA_RULES_DIR").ok().map(PathBuf::from),
        };

        config
            .validate()
            .map_err(|e| AppError::Config(format!("Invalid client configuration: {}", e)))?;
        Ok(config)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} must be a number, got '{}'", name, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 7] = [
        "PERSONA_API_URL",
        "PERSONA_WS_URL",
        "PERSONA_ANALYSIS_TIMEOUT_SECS",
        "PERSONA_REQUEST_TIMEOUT_SECS",
        "PERSONA_MAX_ATTEMPTS",
        "PERSONA_INITIAL_BACKOFF_MS",
        "PERSONA_RULES_DIR",
    ];

    #[test]
    fn test_defaults_when_unset() {
        temp_env::with_vars_unset(VARS, || {
            let config = ClientConfig::from_env().unwrap();
            assert_eq!(config.api_url, DEFAULT_API_URL);
            assert_eq!(config.analysis_timeout(), Duration::from_secs(150));
            assert_eq!(config.max_attempts, 3);
            assert_eq!(config.initial_backoff(), Duration::from_millis(1000));
            assert!(config.rules_dir.is_none());
        });
    }

    #[test]
    fn test_overrides_from_env() {
        temp_env::with_vars(
            [
                ("PERSONA_API_URL", Some("https://analysis.example.org")),
                ("PERSONA_ANALYSIS_TIMEOUT_SECS", Some("30")),
                ("PERSONA_RULES_DIR", Some("/etc/persona")),
            ],
            || {
                let config = ClientConfig::from_env().unwrap();
                assert_eq!(config.api_url, "https://analysis.example.org");
                assert_eq!(config.analysis_timeout_secs, 30);
                assert_eq!(config.rules_dir, Some(PathBuf::from("/etc/persona")));
            },
        );
    }

    #[test]
    fn test_rejects_malformed_values() {
        temp_env::with_var("PERSONA_MAX_ATTEMPTS", Some("many"), || {
            assert!(matches!(ClientConfig::from_env(), Err(AppError::Config(_))));
        });
        temp_env::with_var("PERSONA_API_URL", Some("not a url"), || {
            assert!(matches!(ClientConfig::from_env(), Err(AppError::Config(_))));
        });
        temp_env::with_var("PERSONA_ANALYSIS_TIMEOUT_SECS", Some("0"), || {
            assert!(matches!(ClientConfig::from_env(), Err(AppError::Config(_))));
        });
    }
}
