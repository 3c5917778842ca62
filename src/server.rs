//! Thin HTTP API over the chat pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Run one chat turn against a session's documents |
//! | `POST` | `/passages` | Add pre-chunked passages to a session's collection |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `/passages` is the ingestion hand-off point: document parsing and
//! chunking happen upstream; this endpoint only stores what it is given.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `turn_failed` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::index::{Passage, VectorIndex};
use crate::message::HistoryTurn;
use crate::pipeline::Pipeline;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    index: Arc<dyn VectorIndex>,
}

/// Starts the HTTP server.
///
/// Binds to `[server].bind` and serves until the process is terminated.
/// The pipeline and index are shared across all sessions; isolation
/// between sessions is the index's per-collection scoping.
pub async fn run_server(
    config: &Config,
    pipeline: Arc<Pipeline>,
    index: Arc<dyn VectorIndex>,
) -> anyhow::Result<()> {
    let app = app(pipeline, index);

    info!(bind = %config.server.bind, "docchat listening");

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router over a pipeline and index.
///
/// Used by [`run_server`] and by handler-level tests that drive requests
/// through the router without binding a socket.
pub fn app(pipeline: Arc<Pipeline>, index: Arc<dyn VectorIndex>) -> Router {
    let state = AppState { pipeline, index };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/passages", post(handle_passages))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Turn-level failure: the pipeline returned an error and no partial
/// answer exists.
fn turn_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "turn_failed".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    query: String,
    /// Omitted on the first turn; a fresh session id is minted and echoed.
    session_id: Option<String>,
    #[serde(default)]
    history: Vec<HistoryTurn>,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
    sources: Vec<String>,
    session_id: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if request.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let session_id = request
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let turn = state
        .pipeline
        .handle_chat_turn(&request.query, &session_id, &request.history)
        .await
        .map_err(|e| {
            error!(session_id = %session_id, error = %e, "chat turn failed");
            turn_failed(e.to_string())
        })?;

    Ok(Json(ChatResponse {
        answer: turn.answer,
        sources: turn.sources,
        session_id,
    }))
}

// ============ POST /passages ============

#[derive(Deserialize)]
struct PassageBody {
    text: String,
    source: String,
}

#[derive(Deserialize)]
struct PassagesRequest {
    session_id: String,
    passages: Vec<PassageBody>,
}

#[derive(Serialize)]
struct PassagesResponse {
    message: String,
    count: usize,
    session_id: String,
}

async fn handle_passages(
    State(state): State<AppState>,
    Json(request): Json<PassagesRequest>,
) -> Result<Json<PassagesResponse>, AppError> {
    if request.session_id.trim().is_empty() {
        return Err(bad_request("session_id must not be empty"));
    }
    if request.passages.is_empty() {
        return Err(bad_request("passages must not be empty"));
    }

    let count = request.passages.len();
    let passages: Vec<Passage> = request
        .passages
        .into_iter()
        .map(|p| Passage::new(p.text, p.source))
        .collect();

    state
        .index
        .add_passages(&request.session_id, passages)
        .await
        .map_err(|e| turn_failed(e.to_string()))?;

    Ok(Json(PassagesResponse {
        message: format!("Stored {} passages.", count),
        count,
        session_id: request.session_id,
    }))
}
