//! # Session Module
//!
//! Client side of a long-running analysis on the remote backend.
//!
//! ## Components
//! - `models`: HTTP request/response payloads
//! - `events`: event-channel frames
//! - `client`: `ApiClient` seam and its `reqwest` implementation with retries
//! - `hub`: per-session event routing with scoped subscriptions
//! - `transport`: `EventChannel` seam and the WebSocket implementation
//! - `orchestrator`: submission, progress, interventions and the local timeout

pub mod client;
pub mod events;
pub mod hub;
pub mod models;
pub mod orchestrator;
pub mod transport;

pub use client::{ApiClient, HttpApiClient, RetryPolicy};
pub use events::{AnalysisEvent, ClientCommand, ProgressUpdate};
pub use hub::{EventHub, SessionSubscription};
pub use models::{AnalyzeRequest, AnalyzeResponse, InterventionAnswer, StatusResponse};
pub use orchestrator::{
    AnalysisOutcome, AnalysisPhase, AnalysisStart, AnalysisState, SessionOrchestrator,
};
pub use transport::{EventChannel, WebSocketChannel};

use std::sync::Arc;
use tracing::info;

use crate::config::ClientConfig;
use crate::error::AppError;

/// Orchestrator over the real backend.
pub type LiveOrchestrator = SessionOrchestrator<HttpApiClient, WebSocketChannel>;

/// Builds the HTTP client, connects the event channel and wires both into an
/// orchestrator using `config`'s timeouts.
pub async fn connect(config: &ClientConfig) -> Result<LiveOrchestrator, AppError> {
    let api = HttpApiClient::new(config)?;
    let hub = EventHub::new();
    let channel = WebSocketChannel::connect(&config.ws_url, hub.clone()).await?;
    info!(
        "Session orchestrator ready (api: {}, events: {})",
        config.api_url, config.ws_url
    );
    Ok(SessionOrchestrator::new(Arc::new(api), Arc::new(channel), hub)
        .with_timeout(config.analysis_timeout()))
}
