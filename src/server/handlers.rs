//! Request handlers.  Every handler calls a non-blocking controller entry
//! point and returns immediately; progress arrives on `/v1/events`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::dialogue::{DialogueManager, SessionError, SessionInfo, SessionSummary};
use crate::pipeline::{
    ControllerError, ControllerStatus, EventSubscription, OperationController, ProgressEvent,
    ServiceStatus, TaskId,
};

const DEFAULT_SESSION_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub controller: OperationController,
    pub dialogue: Option<Arc<DialogueManager>>,
}

impl AppState {
    fn dialogue(&self) -> Result<&DialogueManager, ApiError> {
        self.dialogue.as_deref().ok_or_else(|| ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "sessions are disabled".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// `{ "success": false, "error": "…" }` with a matching status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

impl From<ControllerError> for ApiError {
    fn from(e: ControllerError) -> Self {
        let status = match e {
            ControllerError::Conflict(_) | ControllerError::NotRecording => StatusCode::CONFLICT,
            ControllerError::EmptyInput => StatusCode::BAD_REQUEST,
            ControllerError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        };
        log::debug!("server: rejected request: {e}");
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        let status = match e {
            SessionError::InvalidId(_) => StatusCode::BAD_REQUEST,
            _ => {
                log::warn!("server: session storage failed: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskResponse {
    pub success: bool,
    pub task_id: TaskId,
}

impl TaskResponse {
    fn accepted(task_id: TaskId) -> Json<Self> {
        Json(Self {
            success: true,
            task_id,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SendTextRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub pipeline: ControllerStatus,
    pub session: Option<SessionInfo>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub services: Vec<ServiceStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Recording / text
// ---------------------------------------------------------------------------

pub async fn start_recording(State(state): State<AppState>) -> Result<Json<TaskResponse>, ApiError> {
    let id = state.controller.start_recording().await?;
    Ok(TaskResponse::accepted(id))
}

pub async fn stop_recording(State(state): State<AppState>) -> Result<Json<TaskResponse>, ApiError> {
    let id = state.controller.stop_recording().await?;
    Ok(TaskResponse::accepted(id))
}

pub async fn send_text(
    State(state): State<AppState>,
    Json(body): Json<SendTextRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let id = state.controller.send_text(&body.text)?;
    Ok(TaskResponse::accepted(id))
}

// ---------------------------------------------------------------------------
// Event stream
// ---------------------------------------------------------------------------

/// One observer per connection; the subscription is dropped (and so
/// unregistered) when the client disconnects.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let subscription = state.controller.subscribe_events();
    log::info!("server: event stream {} opened", subscription.id());
    Sse::new(progress_stream(subscription)).keep_alive(KeepAlive::default())
}

fn progress_stream(
    subscription: EventSubscription,
) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.recv().await?;
        Some((Ok(to_sse(&event)), subscription))
    })
}

fn to_sse(event: &ProgressEvent) -> SseEvent {
    let sse = SseEvent::default().event(event.kind.as_str());
    match sse.clone().json_data(event) {
        Ok(with_data) => with_data,
        Err(e) => {
            log::warn!("server: could not encode progress event: {e}");
            sse
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let session = match &state.dialogue {
        Some(dialogue) => dialogue.current_session_info().await,
        None => None,
    };
    Json(StatusResponse {
        pipeline: state.controller.get_status(),
        session,
    })
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.controller.is_shut_down() {
        "shutting_down"
    } else {
        "ok"
    };
    Json(HealthResponse {
        status,
        services: state.controller.service_status(),
    })
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

pub async fn new_session(State(state): State<AppState>) -> Result<Json<SessionInfo>, ApiError> {
    Ok(Json(state.dialogue()?.start_new_session().await?))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_SESSION_LIMIT);
    Ok(Json(state.dialogue()?.list_sessions(limit).await))
}

pub async fn current_session(State(state): State<AppState>) -> Result<Json<SessionInfo>, ApiError> {
    state
        .dialogue()?
        .current_session_info()
        .await
        .map(Json)
        .ok_or_else(|| ApiError {
            status: StatusCode::NOT_FOUND,
            message: "no conversation is open".into(),
        })
}

pub async fn load_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    let dialogue = state.dialogue()?;
    if !dialogue.resume_session(&session_id).await? {
        return Err(ApiError {
            status: StatusCode::NOT_FOUND,
            message: format!("session {session_id} not found"),
        });
    }
    dialogue
        .current_session_info()
        .await
        .map(Json)
        .ok_or_else(|| ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "session vanished while loading".into(),
        })
}
