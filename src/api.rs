//! REST API server for the scam investigation orchestrator
//!
//! Poll-driven surface over the session manager: a client starts a session,
//! polls to pull the investigation forward, answers questions when the poll
//! reports `awaiting_input`, and ends the session when done.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use uuid::Uuid;

use crate::error::OrchestrationError;
use crate::models::CaseSnapshot;
use crate::sequencer::StepOutcome;
use crate::session::SessionManager;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    /// External transaction alert identifier.
    pub transaction_id: String,
    /// Opaque transaction record forwarded to the analysis tasks.
    pub transaction: serde_json::Value,
    /// Replace a live session for the same transaction id.
    #[serde(default)]
    pub replace: bool,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub answer: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub sessions: Arc<SessionManager>,
}

fn error_status(e: &OrchestrationError) -> StatusCode {
    match e {
        OrchestrationError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        OrchestrationError::SessionExists(_) => StatusCode::CONFLICT,
        OrchestrationError::SessionClosed(_) => StatusCode::GONE,
        OrchestrationError::NoPendingQuestion | OrchestrationError::TurnOrder(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn snapshot_payload(snapshot: &CaseSnapshot, status: &str) -> serde_json::Value {
    serde_json::json!({
        "status": status,
        "phase": snapshot.phase.to_string(),
        "awaiting_input": snapshot.awaiting_input,
        "finished": snapshot.finished,
        "current_step": snapshot.current_step,
        "total_steps": snapshot.total_steps,
        "pending_question": snapshot.case.pending_question().map(|t| t.question.clone()),
        "snapshot": snapshot,
    })
}

fn outcome_status(outcome: StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::Progressed => "progress",
        StepOutcome::AwaitingAnswer => "awaiting_input",
        StepOutcome::Finished => "finished",
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "active_sessions": state.sessions.session_count().await,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Session Endpoints
/// =============================

async fn start_session(
    State(state): State<ApiState>,
    Json(req): Json<StartRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!("Received start request for transaction: {}", req.transaction_id);

    match state
        .sessions
        .create(&req.transaction_id, req.transaction, req.replace)
        .await
    {
        Ok((session_id, snapshot)) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "session_id": session_id,
                "case_id": snapshot.case.case_id,
                "phase": snapshot.phase.to_string(),
                "total_steps": snapshot.total_steps,
            }))),
        ),
        Err(e) => (
            error_status(&e),
            Json(ApiResponse::error(format!("Failed to start session: {}", e))),
        ),
    }
}

/// One poll pulls the investigation forward by one unit of work and reports
/// where it stands. Clients poll until `awaiting_input` or `finished`.
async fn poll_session(
    State(state): State<ApiState>,
    Path(session_id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.sessions.advance(session_id).await {
        Ok((outcome, snapshot)) => (
            StatusCode::OK,
            Json(ApiResponse::success(snapshot_payload(
                &snapshot,
                outcome_status(outcome),
            ))),
        ),
        Err(e) => (
            error_status(&e),
            Json(ApiResponse::error(format!("Poll failed: {}", e))),
        ),
    }
}

async fn session_status(
    State(state): State<ApiState>,
    Path(session_id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.sessions.status(session_id).await {
        Ok(snapshot) => {
            let status = if snapshot.finished {
                "finished"
            } else if snapshot.awaiting_input {
                "awaiting_input"
            } else {
                "progress"
            };
            (
                StatusCode::OK,
                Json(ApiResponse::success(snapshot_payload(&snapshot, status))),
            )
        }
        Err(e) => (
            error_status(&e),
            Json(ApiResponse::error(format!("Status failed: {}", e))),
        ),
    }
}

async fn submit_answer(
    State(state): State<ApiState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<AnswerRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.sessions.submit_answer(session_id, &req.answer).await {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(ApiResponse::success(snapshot_payload(&snapshot, "progress"))),
        ),
        Err(e) => (
            error_status(&e),
            Json(ApiResponse::error(format!("Answer rejected: {}", e))),
        ),
    }
}

async fn finalize_session(
    State(state): State<ApiState>,
    Path(session_id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.sessions.force_finalize(session_id).await {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(ApiResponse::success(snapshot_payload(&snapshot, "progress"))),
        ),
        Err(e) => (
            error_status(&e),
            Json(ApiResponse::error(format!("Finalize failed: {}", e))),
        ),
    }
}

async fn end_session(
    State(state): State<ApiState>,
    Path(session_id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.sessions.end(session_id).await {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(ApiResponse::success(snapshot_payload(&snapshot, "finished"))),
        ),
        Err(e) => (
            error_status(&e),
            Json(ApiResponse::error(format!("End failed: {}", e))),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(sessions: Arc<SessionManager>) -> Router {
    let state = ApiState { sessions };

    Router::new()
        .route("/health", get(health))
        .route("/api/start", post(start_session))
        .route("/api/poll/:session_id", get(poll_session))
        .route("/api/status/:session_id", get(session_status))
        .route("/api/answer/:session_id", post(submit_answer))
        .route("/api/finalize/:session_id", post(finalize_session))
        .route("/api/end/:session_id", post(end_session))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    sessions: Arc<SessionManager>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(sessions);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::tasks::AnalysisSuite;

    fn test_state() -> ApiState {
        ApiState {
            sessions: Arc::new(SessionManager::new(
                Arc::new(AnalysisSuite::scripted()),
                OrchestratorConfig::default(),
            )),
        }
    }

    #[tokio::test]
    async fn test_start_then_poll_until_awaiting() {
        let state = test_state();

        let (status, Json(response)) = start_session(
            State(state.clone()),
            Json(StartRequest {
                transaction_id: "ALRT-API-1".to_string(),
                transaction: serde_json::json!({"amount": 300}),
                replace: false,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(response.success);

        let session_id: Uuid = serde_json::from_value(
            response.data.unwrap()["session_id"].clone(),
        )
        .unwrap();

        let mut last_status = String::new();
        for _ in 0..16 {
            let (status, Json(response)) =
                poll_session(State(state.clone()), Path(session_id)).await;
            assert_eq!(status, StatusCode::OK);
            last_status = response.data.unwrap()["status"]
                .as_str()
                .unwrap()
                .to_string();
            if last_status != "progress" {
                break;
            }
        }
        assert_eq!(last_status, "awaiting_input");
    }

    #[tokio::test]
    async fn test_duplicate_start_conflicts() {
        let state = test_state();
        let req = || StartRequest {
            transaction_id: "ALRT-API-2".to_string(),
            transaction: serde_json::json!({}),
            replace: false,
        };

        let (status, _) = start_session(State(state.clone()), Json(req())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, Json(response)) = start_session(State(state.clone()), Json(req())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(!response.success);
    }

    #[tokio::test]
    async fn test_answer_without_question_is_bad_request() {
        let state = test_state();
        let (_, Json(response)) = start_session(
            State(state.clone()),
            Json(StartRequest {
                transaction_id: "ALRT-API-3".to_string(),
                transaction: serde_json::json!({}),
                replace: false,
            }),
        )
        .await;
        let session_id: Uuid = serde_json::from_value(
            response.data.unwrap()["session_id"].clone(),
        )
        .unwrap();

        let (status, _) = submit_answer(
            State(state.clone()),
            Path(session_id),
            Json(AnswerRequest {
                answer: "unprompted".to_string(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ended_session_not_found_afterwards() {
        let state = test_state();
        let (_, Json(response)) = start_session(
            State(state.clone()),
            Json(StartRequest {
                transaction_id: "ALRT-API-4".to_string(),
                transaction: serde_json::json!({}),
                replace: false,
            }),
        )
        .await;
        let session_id: Uuid = serde_json::from_value(
            response.data.unwrap()["session_id"].clone(),
        )
        .unwrap();

        let (status, _) = end_session(State(state.clone()), Path(session_id)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = poll_session(State(state.clone()), Path(session_id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
