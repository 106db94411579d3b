//! Drives one long-running analysis from submission to a terminal state.
//!
//! The orchestrator posts the request, then (for asynchronous starts) joins the
//! session on the event channel and spawns a monitor task that races incoming
//! events against the local deadline. Whatever happens first decides the
//! outcome; later events are ignored.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, instrument, warn};
use validator::Validate;

use super::client::ApiClient;
use super::events::AnalysisEvent;
use super::hub::{EventHub, SessionSubscription};
use super::models::{AnalyzeRequest, InterventionAnswer, StatusResponse};
use super::transport::EventChannel;
use crate::config::DEFAULT_ANALYSIS_TIMEOUT_SECS;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisPhase {
    Idle,
    Submitting,
    Running,
    InterventionRequired,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl AnalysisPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AnalysisPhase::Completed
                | AnalysisPhase::Failed
                | AnalysisPhase::TimedOut
                | AnalysisPhase::Cancelled
        )
    }

    pub fn is_pending(self) -> bool {
        matches!(
            self,
            AnalysisPhase::Submitting | AnalysisPhase::Running | AnalysisPhase::InterventionRequired
        )
    }
}

/// Snapshot of the tracked analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisState {
    #[serde(skip)]
    run: u64,
    pub phase: AnalysisPhase,
    pub session_id: Option<String>,
    /// 0 to 100.
    pub progress: f32,
    pub status: Option<String>,
    /// Challenge sent by the backend while the phase is `InterventionRequired`.
    pub intervention: Option<Value>,
    /// Feedback after a rejected intervention answer.
    pub intervention_message: Option<String>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub error_details: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for AnalysisState {
    fn default() -> Self {
        Self {
            run: 0,
            phase: AnalysisPhase::Idle,
            session_id: None,
            progress: 0.0,
            status: None,
            intervention: None,
            intervention_message: None,
            result: None,
            error: None,
            error_details: None,
            started_at: None,
            finished_at: None,
        }
    }
}

impl AnalysisState {
    /// The outcome once the phase is terminal.
    pub fn outcome(&self) -> Option<AnalysisOutcome> {
        let outcome = match self.phase {
            AnalysisPhase::Completed => AnalysisOutcome::Completed {
                results: self.result.clone().unwrap_or(Value::Null),
            },
            AnalysisPhase::Failed => AnalysisOutcome::Failed {
                error: self.error.clone().unwrap_or_default(),
                details: self.error_details.clone(),
            },
            AnalysisPhase::TimedOut => AnalysisOutcome::TimedOut {
                error: self.error.clone().unwrap_or_default(),
            },
            AnalysisPhase::Cancelled => AnalysisOutcome::Cancelled,
            _ => return None,
        };
        Some(outcome)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Completed {
        results: Value,
    },
    Failed {
        error: String,
        details: Option<Value>,
    },
    TimedOut {
        error: String,
    },
    Cancelled,
}

/// What `start_analysis` observed before returning.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisStart {
    /// Running on the backend; progress arrives over the event channel.
    Started { session_id: String },
    /// The backend answered with the final result directly.
    Completed { results: Value },
    /// `cancel()` was called before the backend answered.
    Cancelled,
}

/// Why the monitor stopped.
enum Exit {
    Completed(Value),
    Failed { error: String, details: Option<Value> },
    TimedOut,
    ChannelClosed,
    Stopped,
}

type StateTx = Arc<watch::Sender<AnalysisState>>;

/// Applies `f` only while `run` is the tracked run and it has not finished.
fn update(state: &StateTx, run: u64, f: impl FnOnce(&mut AnalysisState)) -> bool {
    state.send_if_modified(|s| {
        if s.run != run || s.phase.is_terminal() {
            return false;
        }
        f(s);
        true
    })
}

fn finish(
    state: &StateTx,
    run: u64,
    phase: AnalysisPhase,
    f: impl FnOnce(&mut AnalysisState),
) -> bool {
    update(state, run, |s| {
        f(s);
        s.phase = phase;
        s.finished_at = Some(Utc::now());
    })
}

/// Coordinates at most one in-flight analysis.
pub struct SessionOrchestrator<A, C> {
    api: Arc<A>,
    channel: Arc<C>,
    hub: EventHub,
    analysis_timeout: Duration,
    state: StateTx,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
    runs: AtomicU64,
}

impl<A: ApiClient, C: EventChannel> SessionOrchestrator<A, C> {
    pub fn new(api: Arc<A>, channel: Arc<C>, hub: EventHub) -> Self {
        let (state, _) = watch::channel(AnalysisState::default());
        Self {
            api,
            channel,
            hub,
            analysis_timeout: Duration::from_secs(DEFAULT_ANALYSIS_TIMEOUT_SECS),
            state: Arc::new(state),
            cancel: Mutex::new(None),
            runs: AtomicU64::new(0),
        }
    }

    pub fn with_timeout(mut self, analysis_timeout: Duration) -> Self {
        self.analysis_timeout = analysis_timeout;
        self
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn analysis_timeout(&self) -> Duration {
        self.analysis_timeout
    }

    pub fn state(&self) -> AnalysisState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<AnalysisState> {
        self.state.subscribe()
    }

    fn cancel_slot(&self) -> MutexGuard<'_, Option<oneshot::Sender<()>>> {
        self.cancel.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn timeout_message(&self) -> String {
        format!(
            "Analysis timed out after {} seconds",
            self.analysis_timeout.as_secs()
        )
    }

    /// Submits `request`. Rejects with [`AppError::AnalysisInProgress`] while
    /// another analysis is pending.
    #[instrument(skip(self, request), fields(analysis_type = %request.analysis_type))]
    pub async fn start_analysis(&self, request: AnalyzeRequest) -> Result<AnalysisStart, AppError> {
        request.validate()?;

        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let mut busy = None;
        self.state.send_if_modified(|s| {
            if s.phase.is_pending() {
                busy = Some(s.session_id.clone().unwrap_or_else(|| "pending".to_string()));
                return false;
            }
            *s = AnalysisState {
                run,
                phase: AnalysisPhase::Submitting,
                started_at: Some(Utc::now()),
                ..AnalysisState::default()
            };
            true
        });
        if let Some(session_id) = busy {
            warn!("Rejected analysis start, {} is still pending", session_id);
            return Err(AppError::AnalysisInProgress(session_id));
        }

        let deadline = Instant::now() + self.analysis_timeout;
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        *self.cancel_slot() = Some(cancel_tx);

        let response = tokio::select! {
            res = timeout_at(deadline, self.api.start_analysis(&request)) => res,
            _ = &mut cancel_rx => {
                info!("Analysis cancelled before the backend answered");
                return Ok(AnalysisStart::Cancelled);
            }
        };

        let response = match response {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("Analysis request failed: {}", e);
                finish(&self.state, run, AnalysisPhase::Failed, |s| {
                    s.error = Some(e.user_message());
                });
                return Err(e);
            }
            Err(_) => {
                let message = self.timeout_message();
                warn!("{} waiting for the backend", message);
                finish(&self.state, run, AnalysisPhase::TimedOut, |s| {
                    s.error = Some(message.clone());
                });
                return Err(AppError::Timeout(message));
            }
        };

        let Some(session_id) = response.session_id().map(str::to_string) else {
            let results = response.into_value();
            let recorded = finish(&self.state, run, AnalysisPhase::Completed, |s| {
                s.progress = 100.0;
                s.result = Some(results.clone());
            });
            if !recorded {
                return Ok(AnalysisStart::Cancelled);
            }
            info!("Analysis completed synchronously");
            return Ok(AnalysisStart::Completed { results });
        };

        // Subscribe before joining so nothing emitted after the join is missed.
        let subscription = self.hub.subscribe(&session_id);
        let running = update(&self.state, run, |s| {
            s.phase = AnalysisPhase::Running;
            s.session_id = Some(session_id.clone());
        });
        if !running {
            return Ok(AnalysisStart::Cancelled);
        }

        if let Err(e) = self.channel.join(&session_id).await {
            warn!(session_id = %session_id, "Could not join analysis session: {}", e);
            finish(&self.state, run, AnalysisPhase::Failed, |s| {
                s.error = Some(e.user_message());
            });
            return Err(e);
        }

        info!(session_id = %session_id, "Analysis started");
        let monitor = Monitor {
            state: Arc::clone(&self.state),
            channel: Arc::clone(&self.channel),
            run,
            timeout_message: self.timeout_message(),
        };
        tokio::spawn(monitor.run(subscription, deadline, cancel_rx));

        Ok(AnalysisStart::Started { session_id })
    }

    /// Waits until the tracked analysis reaches a terminal phase.
    pub async fn wait_for_outcome(&self) -> Result<AnalysisOutcome, AppError> {
        let mut rx = self.state.subscribe();
        if rx.borrow().phase == AnalysisPhase::Idle {
            return Err(AppError::Validation(
                "No analysis has been started".to_string(),
            ));
        }
        let state = rx
            .wait_for(|s| s.phase.is_terminal())
            .await
            .map_err(|_| AppError::Internal("Analysis state closed".to_string()))?;
        state
            .outcome()
            .ok_or_else(|| AppError::Internal("Terminal phase without outcome".to_string()))
    }

    /// Answers the backend's intervention challenge. On success the analysis
    /// resumes; a wrong answer leaves it waiting for another try.
    #[instrument(skip(self, answer))]
    pub async fn resolve_intervention(&self, answer: &str) -> Result<StatusResponse, AppError> {
        let (run, session_id) = {
            let state = self.state.borrow();
            match (state.phase, &state.session_id) {
                (AnalysisPhase::InterventionRequired, Some(id)) => (state.run, id.clone()),
                _ => {
                    return Err(AppError::Validation(
                        "No intervention is active for this analysis".to_string(),
                    ))
                }
            }
        };

        let response = self
            .api
            .resolve_intervention(&InterventionAnswer {
                session_id: session_id.clone(),
                answer: answer.trim().to_string(),
            })
            .await?;

        update(&self.state, run, |s| {
            if s.phase == AnalysisPhase::InterventionRequired {
                s.phase = AnalysisPhase::Running;
                s.intervention = None;
                s.intervention_message = None;
            }
        });
        info!(session_id = %session_id, "Intervention resolved, analysis resuming");
        Ok(response)
    }

    /// Stops tracking the pending analysis. Local only: the backend keeps
    /// running it. Returns whether anything was pending.
    pub fn cancel(&self) -> bool {
        let cancelled = self.state.send_if_modified(|s| {
            if !s.phase.is_pending() {
                return false;
            }
            s.phase = AnalysisPhase::Cancelled;
            s.error = Some("Analysis cancelled".to_string());
            s.finished_at = Some(Utc::now());
            true
        });
        if cancelled {
            if let Some(tx) = self.cancel_slot().take() {
                let _ = tx.send(());
            }
            info!("Analysis cancelled locally");
        }
        cancelled
    }
}

/// Background task owning one session's subscription.
struct Monitor<C> {
    state: StateTx,
    channel: Arc<C>,
    run: u64,
    timeout_message: String,
}

impl<C: EventChannel> Monitor<C> {
    async fn run(
        self,
        mut subscription: SessionSubscription,
        deadline: Instant,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let session_id = subscription.session_id().to_string();
        let timer = sleep_until(deadline);
        tokio::pin!(timer);

        let exit = loop {
            tokio::select! {
                _ = &mut cancel_rx => break Exit::Stopped,
                _ = &mut timer => break Exit::TimedOut,
                event = subscription.recv() => {
                    let Some(event) = event else {
                        break Exit::ChannelClosed;
                    };
                    if event.session_id() != session_id {
                        debug!(event = event.name(), "Ignoring event for another session");
                        continue;
                    }
                    if let Some(exit) = self.apply(event) {
                        break exit;
                    }
                }
            }
        };

        drop(subscription);
        self.conclude(&session_id, exit);

        if let Err(e) = self.channel.leave(&session_id).await {
            warn!(session_id = %session_id, "Failed to leave analysis session: {}", e);
        }
    }

    /// Folds a non-terminal event into the state, or returns the exit for a
    /// terminal one.
    fn apply(&self, event: AnalysisEvent) -> Option<Exit> {
        match event {
            AnalysisEvent::Progress(progress) => {
                update(&self.state, self.run, |s| {
                    s.progress = progress.percent();
                    if let Some(text) = progress.status_text() {
                        s.status = Some(text.to_string());
                    }
                });
                None
            }
            AnalysisEvent::Intervention { intervention, .. } => {
                info!("Backend requested an intervention");
                update(&self.state, self.run, |s| {
                    s.phase = AnalysisPhase::InterventionRequired;
                    s.intervention = Some(intervention);
                    s.intervention_message = None;
                });
                None
            }
            AnalysisEvent::InterventionFailed { message, .. } => {
                update(&self.state, self.run, |s| {
                    s.intervention_message = Some(message);
                });
                None
            }
            AnalysisEvent::Complete { results, .. } => Some(Exit::Completed(results)),
            AnalysisEvent::Error { error, details, .. } => Some(Exit::Failed { error, details }),
        }
    }

    fn conclude(&self, session_id: &str, exit: Exit) {
        match exit {
            Exit::Completed(results) => {
                info!(session_id, "Analysis completed");
                finish(&self.state, self.run, AnalysisPhase::Completed, |s| {
                    s.progress = 100.0;
                    s.result = Some(results);
                });
            }
            Exit::Failed { error, details } => {
                warn!(session_id, "Analysis failed: {}", error);
                finish(&self.state, self.run, AnalysisPhase::Failed, |s| {
                    s.error = Some(error);
                    s.error_details = details;
                });
            }
            Exit::TimedOut => {
                warn!(session_id, "{}", self.timeout_message);
                finish(&self.state, self.run, AnalysisPhase::TimedOut, |s| {
                    s.error = Some(self.timeout_message.clone());
                });
            }
            Exit::ChannelClosed => {
                warn!(session_id, "Event channel closed before the analysis finished");
                finish(&self.state, self.run, AnalysisPhase::Failed, |s| {
                    s.error = Some("Lost connection to the analysis server.".to_string());
                });
            }
            Exit::Stopped => debug!(session_id, "Monitor stopped"),
        }
    }
}
