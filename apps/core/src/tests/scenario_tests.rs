//! End-to-End Scenario Tests
//!
//! Full flows across modules: transcripts through the parser into the risk
//! assessor, and analyses driven over a mocked HTTP backend with events
//! arriving on the hub or a local WebSocket server.

use crate::classifier::{ClassifyOptions, LexicalClassifier};
use crate::config::ClientConfig;
use crate::error::AppError;
use crate::parser::{joined_content, parse_conversation_text, speakers};
use crate::risk::{AssessmentContext, RiskAssessor, RiskLevel};
use crate::session::{
    self, AnalysisEvent, AnalysisOutcome, AnalysisPhase, AnalysisStart, AnalyzeRequest, EventHub,
    HttpApiClient, RetryPolicy, SessionOrchestrator,
};
use crate::tests::orchestrator_tests::{complete, progress, settle, MockEventChannel};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_client(server: &MockServer) -> HttpApiClient {
    let config = ClientConfig {
        api_url: server.uri(),
        ..ClientConfig::default()
    };
    HttpApiClient::new(&config).unwrap().with_retry(RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(10),
    })
}

async fn mount_started(server: &MockServer, session_id: &str) {
    Mock::given(method("POST"))
        .and(path("/api/analyze"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "started", "session_id": session_id})),
        )
        .mount(server)
        .await;
}

/// Accepts one WebSocket client. Each `join_analysis` is answered with a
/// progress frame and a completion for that session; every inbound frame is
/// forwarded to the returned receiver.
async fn spawn_event_server(results: Value) -> (String, mpsc::UnboundedReceiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let frame: Value = serde_json::from_str(text.as_str()).unwrap();
            let _ = seen_tx.send(frame.clone());
            if frame["event"] != "join_analysis" {
                continue;
            }
            let session_id = frame["data"]["session_id"].clone();
            for reply in [
                json!({"event": "analysis_progress", "data": {"session_id": session_id, "progress": 50, "current_step": "Performing analysis"}}),
                json!({"event": "analysis_complete", "data": {"session_id": session_id, "results": results}}),
            ] {
                ws.send(Message::Text(reply.to_string().into())).await.unwrap();
            }
        }
    });

    (format!("ws://{}", addr), seen_rx)
}

// ============================================================================
// Local Analysis Scenarios
// ============================================================================

#[cfg(test)]
mod local_scenarios {
    use super::*;

    #[test]
    fn test_distress_message_is_medium_depression() {
        let assessor = RiskAssessor::new();
        let text = "I feel so hopeless and worthless, nothing matters anymore";

        let result = assessor
            .assess(text, &AssessmentContext::for_session("chat-1"))
            .unwrap();

        assert!(result.has_concern("depression"));
        assert_eq!(result.concerns.len(), 1);
        assert!((result.concerns[0].severity - 4.0 / 6.0).abs() < 1e-5);
        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert!(!result.requires_intervention);
        assert_eq!(result.session_id, "chat-1");

        let classification =
            LexicalClassifier::new().classify(text, &ClassifyOptions::default());
        assert_eq!(classification.metrics.word_count, 9);
        assert_eq!(classification.metrics.sentence_count, 1);
    }

    #[test]
    fn test_transcript_to_assessment() {
        let raw = "Alice: I feel so alone lately\n\nBob: I'm here for you\nAlice: no one understands me";
        let turns = parse_conversation_text(raw);

        assert_eq!(turns.len(), 3);
        assert_eq!(speakers(&turns), vec!["Alice", "Bob"]);

        let content = joined_content(&turns);
        assert_eq!(
            content,
            "I feel so alone lately I'm here for you no one understands me"
        );

        let assessor = RiskAssessor::new();
        let result = assessor
            .assess(&content, &AssessmentContext::default())
            .unwrap();
        assert!(result.has_concern("isolation"));
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(result.session_id, "default-session");
    }

    #[test]
    fn test_crisis_inside_transcript() {
        let turns = parse_conversation_text("Sam: honestly I want to kill myself\nLee: please call someone");
        let result = RiskAssessor::new()
            .assess(&joined_content(&turns), &AssessmentContext::default())
            .unwrap();
        assert_eq!(result.risk_level, RiskLevel::Crisis);
        assert!(result.requires_intervention);
    }
}

// ============================================================================
// Remote Analysis Scenarios
// ============================================================================

#[cfg(test)]
mod remote_scenarios {
    use super::*;

    #[tokio::test]
    async fn test_http_start_with_hub_events() {
        let server = MockServer::start().await;
        mount_started(&server, "web-1").await;
        Mock::given(method("POST"))
            .and(path("/api/resolve_intervention"))
            .and(body_partial_json(json!({"session_id": "web-1", "answer": "4"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"status": "success", "message": "Verification successful."}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let channel = Arc::new(MockEventChannel::new());
        let hub = EventHub::new();
        let orchestrator = SessionOrchestrator::new(
            Arc::new(fast_client(&server)),
            Arc::clone(&channel),
            hub.clone(),
        );

        let start = orchestrator
            .start_analysis(AnalyzeRequest::from_text("Alice: hi\nBob: hello"))
            .await
            .unwrap();
        assert_eq!(
            start,
            AnalysisStart::Started {
                session_id: "web-1".to_string()
            }
        );
        assert_eq!(channel.joined(), vec!["web-1"]);

        let mut state = orchestrator.watch_state();
        hub.publish(progress("web-1", 40.0, "Analyzing"));
        hub.publish(AnalysisEvent::Intervention {
            session_id: "web-1".to_string(),
            intervention: json!({"question": "What is 2 + 2?"}),
        });
        state
            .wait_for(|s| s.phase == AnalysisPhase::InterventionRequired)
            .await
            .unwrap();
        assert_eq!(orchestrator.state().progress, 40.0);

        let ack = orchestrator.resolve_intervention(" 4 ").await.unwrap();
        assert_eq!(ack.status, "success");
        assert_eq!(orchestrator.state().phase, AnalysisPhase::Running);

        hub.publish(complete("web-1", json!({"summary": "friendly"})));
        let outcome = orchestrator.wait_for_outcome().await.unwrap();
        assert_eq!(
            outcome,
            AnalysisOutcome::Completed {
                results: json!({"summary": "friendly"})
            }
        );

        settle().await;
        assert_eq!(channel.left(), vec!["web-1"]);
        assert_eq!(hub.total_listeners(), 0);
    }

    #[tokio::test]
    async fn test_http_synchronous_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .and(body_partial_json(json!({"analysis_type": "quick"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "completed", "results": {"tone": "warm"}})),
            )
            .mount(&server)
            .await;

        let channel = Arc::new(MockEventChannel::new());
        let orchestrator = SessionOrchestrator::new(
            Arc::new(fast_client(&server)),
            Arc::clone(&channel),
            EventHub::new(),
        );

        let start = orchestrator
            .start_analysis(AnalyzeRequest::from_text("hello").with_analysis_type("quick"))
            .await
            .unwrap();
        let AnalysisStart::Completed { results } = start else {
            panic!("expected a synchronous result, got {:?}", start);
        };
        assert_eq!(results["results"]["tone"], "warm");
        assert_eq!(orchestrator.state().phase, AnalysisPhase::Completed);
        assert!(channel.joined().is_empty());
    }

    #[tokio::test]
    async fn test_http_server_error_fails_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"error": "Model unavailable"})),
            )
            // Two starts, three attempts each.
            .expect(6)
            .mount(&server)
            .await;

        let orchestrator = SessionOrchestrator::new(
            Arc::new(fast_client(&server)),
            Arc::new(MockEventChannel::new()),
            EventHub::new(),
        );

        let err = orchestrator
            .start_analysis(AnalyzeRequest::from_text("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Transport { status: Some(500), .. }));

        let state = orchestrator.state();
        assert_eq!(state.phase, AnalysisPhase::Failed);
        assert!(matches!(
            state.outcome(),
            Some(AnalysisOutcome::Failed { .. })
        ));
        // A failed analysis does not block the next one.
        assert!(matches!(
            orchestrator
                .start_analysis(AnalyzeRequest::from_text("again"))
                .await,
            Err(AppError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_event_channel_fails_before_deadline() {
        let server = MockServer::start().await;
        mount_started(&server, "live-9").await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            let _ = ws.next().await;
            let _ = ws.close(None).await;
        });

        let config = ClientConfig {
            api_url: server.uri(),
            ws_url: format!("ws://{}", addr),
            ..ClientConfig::default()
        };
        let orchestrator = session::connect(&config).await.unwrap();
        orchestrator
            .start_analysis(AnalyzeRequest::from_text("Alice: hi"))
            .await
            .unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), orchestrator.wait_for_outcome())
            .await
            .expect("a closed socket must end the analysis well before the 150s deadline")
            .unwrap();
        assert_eq!(
            outcome,
            AnalysisOutcome::Failed {
                error: "Lost connection to the analysis server.".to_string(),
                details: None,
            }
        );
        assert_eq!(orchestrator.hub().total_listeners(), 0);
    }

    #[tokio::test]
    async fn test_live_orchestrator_over_websocket() {
        let server = MockServer::start().await;
        mount_started(&server, "live-7").await;
        let (ws_url, mut frames) = spawn_event_server(json!({"score": 0.8})).await;

        let config = ClientConfig {
            api_url: server.uri(),
            ws_url,
            ..ClientConfig::default()
        };
        let orchestrator = session::connect(&config).await.unwrap();
        assert_eq!(orchestrator.analysis_timeout(), Duration::from_secs(150));

        orchestrator
            .start_analysis(AnalyzeRequest::from_text("Alice: hi"))
            .await
            .unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), orchestrator.wait_for_outcome())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            outcome,
            AnalysisOutcome::Completed {
                results: json!({"score": 0.8})
            }
        );

        let joined = frames.recv().await.unwrap();
        assert_eq!(joined, json!({"event": "join_analysis", "data": {"session_id": "live-7"}}));
        let left = tokio::time::timeout(Duration::from_secs(5), frames.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(left, json!({"event": "leave_analysis", "data": {"session_id": "live-7"}}));
    }
}
