//! HTTP service.
//!
//! Exposes report analysis and ad-hoc questions as a JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/uuid/analyze` | Fetch, ingest and analyse a report: `{"uuid"}` |
//! | `POST` | `/prompt/analyze` | Same, with a one-off instruction: `{"uuid", "prompt" \| "question"}` |
//! | `POST` | `/ask` | Answer a question from the nearest chunks: `{"question", "top_k"?}` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Responses
//!
//! A finished analysis returns `{"result": "ok", "team": ...}`. When the
//! report was ingested but the analysis or its delivery failed, the status is
//! still 200 with `{"result": "partial", "error": ...}`.
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "uuid not provided" } }
//! ```
//!
//! Error codes: `bad_request` (400), `fetch_failed` (500), `ingest_failed`
//! (500), `invalid_upstream_json` (502), and the query engine codes for
//! `/ask` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use allure_rag_core::RagError;

use crate::allure::{FetchError, ReportSource};
use crate::pipeline::{Delivery, Pipeline};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub source: Arc<dyn ReportSource>,
    pub default_top_k: usize,
}

/// Build the router with all routes and the CORS layer.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/uuid/analyze", post(handle_analyze))
        .route("/prompt/analyze", post(handle_prompt_analyze))
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bind to `bind` and serve until the process is terminated.
pub async fn run_server(bind: &str, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("listening on http://{}", bind);
    axum::serve(listener, app).await?;
    Ok(())
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

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
        }
    }
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
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::InvalidReportId(msg) => bad_request(msg),
            FetchError::InvalidJson { .. } => {
                AppError::new(StatusCode::BAD_GATEWAY, "invalid_upstream_json", err.to_string())
            }
            other => AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "fetch_failed", other.to_string()),
        }
    }
}

/// Ingestion errors: bad input is the caller's fault, anything else is ours.
fn ingest_error(err: RagError) -> AppError {
    match err {
        RagError::Validation(msg) => bad_request(msg),
        other => AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "ingest_failed", other.to_string()),
    }
}

fn query_error(err: RagError) -> AppError {
    match err {
        RagError::Validation(msg) => bad_request(msg),
        other => AppError::new(StatusCode::INTERNAL_SERVER_ERROR, other.code(), other.to_string()),
    }
}

// ============ Analysis ============

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
}

impl AnalyzeRequest {
    fn uuid(&self) -> Result<&str, AppError> {
        self.uuid
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| bad_request("uuid not provided"))
    }

    fn instruction(&self) -> Option<&str> {
        self.prompt
            .as_deref()
            .or(self.question.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum AnalyzeResponse {
    Ok { team: String },
    Partial { error: String },
}

async fn analyze(
    state: &AppState,
    report_id: &str,
    prompt: Option<&str>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    tracing::info!(report_id, custom_prompt = prompt.is_some(), "analysis requested");

    let raw = state.source.fetch_report(report_id).await.map_err(|e| {
        tracing::error!(report_id, error = %e, "report fetch failed");
        AppError::from(e)
    })?;

    let (outcome, delivery) = state
        .pipeline
        .process(&raw, report_id, prompt)
        .await
        .map_err(|e| {
            tracing::error!(report_id, code = e.code(), error = %e, "ingestion failed");
            ingest_error(e)
        })?;

    Ok(Json(match delivery {
        Delivery::Delivered { .. } => AnalyzeResponse::Ok { team: outcome.team },
        Delivery::Partial { error } => AnalyzeResponse::Partial { error },
    }))
}

/// Handler for `POST /uuid/analyze`.
async fn handle_analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let report_id = req.uuid()?;
    analyze(&state, report_id, None).await
}

/// Handler for `POST /prompt/analyze`. The prompt applies to this request only.
async fn handle_prompt_analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let report_id = req.uuid()?;
    let prompt = req
        .instruction()
        .ok_or_else(|| bad_request("prompt not provided"))?;
    analyze(&state, report_id, Some(prompt)).await
}

// ============ POST /ask ============

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let top_k = req.top_k.unwrap_or(state.default_top_k);
    let answer = state
        .pipeline
        .engine()
        .ask(&req.question, top_k)
        .await
        .map_err(query_error)?;
    Ok(Json(AskResponse { answer }))
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
