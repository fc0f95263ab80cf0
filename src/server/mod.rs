//! HTTP/JSON front-end with a Server-Sent-Events progress stream.
//!
//! | Method | Path                        | Controller call        |
//! |--------|-----------------------------|------------------------|
//! | POST   | `/v1/recording/start`       | `start_recording`      |
//! | POST   | `/v1/recording/stop`        | `stop_recording`       |
//! | POST   | `/v1/text`                  | `send_text`            |
//! | GET    | `/v1/events`                | `subscribe_events` (SSE) |
//! | GET    | `/v1/status`                | `get_status`           |
//! | GET    | `/v1/health`                | `service_status`       |
//! | POST   | `/v1/sessions`              | new conversation       |
//! | GET    | `/v1/sessions?limit=`       | list conversations     |
//! | GET    | `/v1/sessions/current`      | current conversation   |
//! | POST   | `/v1/sessions/:id/load`     | resume a conversation  |
//!
//! Rejections come back as `{ "success": false, "error": "…" }`:
//! 409 for a conflicting or missing recording, 400 for empty text,
//! 503 once the assistant is shutting down.

pub mod handlers;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;

use crate::dialogue::DialogueManager;
use crate::pipeline::OperationController;

pub use handlers::{ApiError, AppState, TaskResponse};

pub const SOURCE: &str = "rpc";

pub fn router(controller: &OperationController, dialogue: Option<Arc<DialogueManager>>) -> Router {
    let state = AppState {
        controller: controller.with_source(SOURCE),
        dialogue,
    };

    Router::new()
        .route("/v1/recording/start", post(handlers::start_recording))
        .route("/v1/recording/stop", post(handlers::stop_recording))
        .route("/v1/text", post(handlers::send_text))
        .route("/v1/events", get(handlers::event_stream))
        .route("/v1/status", get(handlers::status))
        .route("/v1/health", get(handlers::health))
        .route(
            "/v1/sessions",
            post(handlers::new_session).get(handlers::list_sessions),
        )
        .route("/v1/sessions/current", get(handlers::current_session))
        .route("/v1/sessions/:id/load", post(handlers::load_session))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log::info!("server: listening on http://{addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;

    log::info!("server: stopped");
    Ok(())
}
