use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use nexus::models::update::{TaskUpdate, UpdateKind};
use nexus::orchestrator::TaskHandle;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};

#[derive(Debug, Serialize, Deserialize)]
struct OrchestrateRequest {
    query: String,
}

#[derive(Debug, Serialize)]
struct OrchestrateResponse {
    task_id: String,
    #[serde(flatten)]
    update: TaskUpdate,
}

/// Streams task updates as server-sent events, one `data: <json>` frame per update.
/// Dropping the response body drops the task handle, which cancels the task.
struct SseResponse {
    handle: TaskHandle,
}

impl SseResponse {
    fn new(handle: TaskHandle) -> Self {
        Self { handle }
    }
}

fn format_event(update: &TaskUpdate) -> String {
    let payload = serde_json::to_string(update).unwrap_or_else(|e| {
        json!({"type": "error", "content": format!("Failed to encode update: {}", e)})
            .to_string()
    });
    format!("data: {}\n\n", payload)
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.handle)
            .poll_next(cx)
            .map(|opt| opt.map(|update| Ok(Bytes::from(format_event(&update)))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        let task_id = HeaderValue::from_str(self.handle.id()).ok();
        let mut response = (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            Body::from_stream(self),
        )
            .into_response();
        if let Some(task_id) = task_id {
            response.headers_mut().insert("x-task-id", task_id);
        }
        response
    }
}

fn bad_request() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "query must not be empty"})),
    )
        .into_response()
}

async fn stream_handler(
    State(state): State<AppState>,
    Json(request): Json<OrchestrateRequest>,
) -> Response {
    if request.query.trim().is_empty() {
        return bad_request();
    }

    let handle = state.orchestrator.execute_task(request.query);
    tracing::info!(task_id = %handle.id(), "Streaming task");
    SseResponse::new(handle).into_response()
}

// run a task to completion, non streaming
async fn handler(
    State(state): State<AppState>,
    Json(request): Json<OrchestrateRequest>,
) -> Response {
    if request.query.trim().is_empty() {
        return bad_request();
    }

    let mut handle = state.orchestrator.execute_task(request.query);
    let task_id = handle.id().to_string();
    tracing::info!(task_id = %task_id, "Running task");

    let mut terminal = None;
    while let Some(update) = handle.next().await {
        if update.is_terminal() {
            terminal = Some(update);
            break;
        }
    }

    let update = terminal.unwrap_or_else(|| {
        tracing::error!(task_id = %task_id, "Task ended without a terminal update");
        TaskUpdate::error(
            "Task ended without a result",
            nexus::errors::AgentError::Internal("missing terminal update".to_string()),
        )
    });
    let status = match update.kind {
        UpdateKind::Result => StatusCode::OK,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(OrchestrateResponse { task_id, update })).into_response()
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/orchestrate", post(handler))
        .route("/orchestrate/stream", post(stream_handler))
        .with_state(state)
}
