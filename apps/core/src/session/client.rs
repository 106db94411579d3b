//! HTTP access to the analysis backend.

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;
use validator::Validate;

use super::models::{
    AnalyzeRequest, AnalyzeResponse, HealthResponse, InterventionAnswer, KeyValidation,
    ModelsResponse, ParseResponse, StatusResponse,
};
use crate::config::ClientConfig;
use crate::error::AppError;

/// Backend calls the orchestrator depends on.
#[async_trait]
pub trait ApiClient: Send + Sync + 'static {
    /// `POST /api/analyze`.
    async fn start_analysis(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, AppError>;

    /// `POST /api/resolve_intervention`.
    async fn resolve_intervention(
        &self,
        answer: &InterventionAnswer,
    ) -> Result<StatusResponse, AppError>;
}

/// Exponential backoff for retryable transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff(),
        }
    }

    /// Delay before retry number `attempt` (1-based): 1x, 2x, 4x, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }
}

/// `reqwest`-backed [`ApiClient`] that also exposes the auxiliary endpoints.
#[derive(Clone)]
pub struct HttpApiClient {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl HttpApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: Url::parse(&config.api_url)?,
            retry: RetryPolicy::from_config(config),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, AppError> {
        Ok(self.base_url.join(path)?)
    }

    /// Sends a request, retrying retryable failures per the [`RetryPolicy`].
    async fn request<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, AppError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        let url = self.endpoint(path)?;
        let mut attempt = 1;
        loop {
            match self.send_once(method.clone(), url.clone(), body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "{} {} failed on attempt {}/{} ({}), retrying in {:?}",
                        method, path, attempt, self.retry.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once<T, B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T, AppError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        let mut builder = self.client.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let res = builder.send().await?;
        let status = res.status();
        let text = res.text().await?;

        if !status.is_success() {
            debug!("Backend responded {}: {}", status, text);
            return Err(AppError::from_status(status.as_u16(), server_message(&text)));
        }

        serde_json::from_str(&text).map_err(|e| {
            warn!("Undecodable backend response: {}", e);
            AppError::Transport {
                status: Some(status.as_u16()),
                retryable: false,
                message: "Unexpected response from the analysis server.".to_string(),
            }
        })
    }

    #[instrument(skip(self))]
    pub async fn health(&self) -> Result<HealthResponse, AppError> {
        self.request::<_, ()>(Method::GET, "/api/health", None).await
    }

    pub async fn get_config(&self) -> Result<Value, AppError> {
        self.request::<_, ()>(Method::GET, "/api/config", None).await
    }

    pub async fn update_config(&self, config: &Value) -> Result<StatusResponse, AppError> {
        self.request(Method::POST, "/api/config", Some(config)).await
    }

    pub async fn models(&self) -> Result<ModelsResponse, AppError> {
        self.request::<_, ()>(Method::GET, "/api/models", None).await
    }

    pub async fn parse(&self, text: &str) -> Result<ParseResponse, AppError> {
        if text.trim().is_empty() {
            return Err(AppError::Validation("No text provided for parsing".to_string()));
        }
        let body = serde_json::json!({ "text": text });
        self.request(Method::POST, "/api/parse", Some(&body)).await
    }

    pub async fn validate_key(&self, api_key: &str) -> Result<KeyValidation, AppError> {
        if api_key.trim().is_empty() {
            return Err(AppError::Validation("No API key provided".to_string()));
        }
        let body = serde_json::json!({ "api_key": api_key.trim() });
        self.request(Method::POST, "/api/validate_key", Some(&body)).await
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    #[instrument(skip(self, request), fields(analysis_type = %request.analysis_type))]
    async fn start_analysis(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, AppError> {
        request.validate()?;
        self.request(Method::POST, "/api/analyze", Some(request)).await
    }

    #[instrument(skip(self, answer), fields(session_id = %answer.session_id))]
    async fn resolve_intervention(
        &self,
        answer: &InterventionAnswer,
    ) -> Result<StatusResponse, AppError> {
        answer.validate()?;
        self.request(Method::POST, "/api/resolve_intervention", Some(answer))
            .await
    }
}

/// `message` (or `error`) from an error body, if it is JSON.
fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}
