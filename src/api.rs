use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use crate::config::AppConfig;
use crate::events::EventSink;
use crate::github::SourceControl;
use crate::models::Job;
use crate::pipeline::Orchestrator;
use crate::planner::ModelProvider;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub config: AppConfig,
    pub source_control: Arc<dyn SourceControl>,
    pub model: Arc<dyn ModelProvider>,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRequest {
    pub repo_url: Option<String>,
    pub prompt: Option<String>,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/code", post(submit_code_request))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

/// Accept a change request and answer with the job's event stream. The
/// response stays open until the job emits its terminal event; dropping
/// the connection cancels the job.
async fn submit_code_request(
    State(state): State<SharedState>,
    Json(req): Json<CodeRequest>,
) -> Result<Response, ApiError> {
    let repo_url = req.repo_url.as_deref().unwrap_or("").trim().to_string();
    if repo_url.is_empty() {
        return Err(ApiError::BadRequest("repoUrl is required".to_string()));
    }
    let prompt = req.prompt.as_deref().unwrap_or("").trim().to_string();
    if prompt.is_empty() {
        return Err(ApiError::BadRequest("prompt is required".to_string()));
    }

    let job = Job::new(&repo_url, &prompt, &state.config.model, state.config.job_timeout);
    info!(job = %job.id, repo = %repo_url, "Accepted code change request");

    let (sink, rx) = EventSink::channel();
    let orchestrator = Orchestrator::new(
        state.config.clone(),
        state.source_control.clone(),
        state.model.clone(),
    );
    tokio::spawn(async move { orchestrator.run(job, sink).await });

    let stream = ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(event.to_frame()));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────
