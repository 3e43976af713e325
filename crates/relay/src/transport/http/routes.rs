//! HTTP route handlers.
//!
//! - `POST /api/execute`  producer submits `{payload, label}` and waits
//! - `GET  /api/command`  executor polls for the next work item (`null` if none)
//! - `POST /api/result`   executor deposits a result
//! - `GET  /api/status`   liveness and queue depth

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::service::{DepositError, RelayService, StatusSnapshot};
use crate::version::VersionInfo;
use crate::work::{RelayResult, WorkItem};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub payload: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub service_up: bool,
    pub executor_connected: bool,
    pub pending_count: usize,
    /// Rounded to a tenth of a second; None if the executor never polled.
    pub seconds_since_last_seen: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub awaiting_count: usize,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    #[serde(flatten)]
    status: StatusResponse,
    version: VersionInfo,
}

impl StatusResponse {
    pub fn from_snapshot(snapshot: &StatusSnapshot) -> Self {
        Self {
            service_up: true,
            executor_connected: snapshot.executor_connected(),
            pending_count: snapshot.pending_count,
            seconds_since_last_seen: snapshot
                .liveness
                .since_last_seen
                .map(|d| (d.as_secs_f64() * 10.0).round() / 10.0),
            last_seen_at: snapshot.liveness.last_seen_at,
            awaiting_count: snapshot.awaiting_count,
        }
    }
}

async fn execute(
    State(service): State<Arc<RelayService>>,
    Json(request): Json<ExecuteRequest>,
) -> Json<RelayResult> {
    // 200 even on timeout - a missing executor is data, not an HTTP error
    Json(service.submit(request.payload, request.label).await)
}

async fn next_command(State(service): State<Arc<RelayService>>) -> Json<Option<WorkItem>> {
    Json(service.dequeue())
}

async fn deposit_result(
    State(service): State<Arc<RelayService>>,
    Json(result): Json<RelayResult>,
) -> impl IntoResponse {
    match service.deposit(result) {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({ "ok": true }))),
        Err(e @ DepositError::UnknownId(_)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "ok": false,
                "error": e.to_string()
            })),
        ),
    }
}

async fn status(State(service): State<Arc<RelayService>>) -> impl IntoResponse {
    let snapshot = service.status();
    Json(StatusBody {
        status: StatusResponse::from_snapshot(&snapshot),
        version: snapshot.version,
    })
}

async fn shutdown(State(service): State<Arc<RelayService>>) -> impl IntoResponse {
    tracing::info!("Shutdown requested via HTTP");
    service.trigger_shutdown();
    (StatusCode::OK, Json(serde_json::json!({})))
}

pub fn routes(service: Arc<RelayService>) -> Router {
    Router::new()
        .route("/api/execute", post(execute))
        .route("/api/command", get(next_command))
        .route("/api/result", post(deposit_result))
        .route("/api/status", get(status))
        .route("/shutdown", post(shutdown))
        .with_state(service)
}
