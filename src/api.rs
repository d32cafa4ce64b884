//! HTTP surface for the summarizer.
//!
//! This module exposes a compact Axum router:
//!
//! - `GET /` – Welcome message.
//! - `GET /health` – Probe the history store; returns `{ "status": "ok" }`.
//! - `POST /split` – Split text with one pass and return the chunks, without calling a model.
//! - `POST /summarize` – Run the dual-path map-reduce pipeline. Returns the summary, processing
//!   time, and the id of the stored history record (absent in test mode).
//! - `GET /history` – Most recent runs, newest first.
//! - `GET /history/:id` – One stored run.
//! - `DELETE /history/:id` – Remove one stored run.
//! - `GET /metrics` – Run counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.

use crate::history::{HistoryError, HistoryRecord};
use crate::llm::ModelError;
use crate::processing::{ChunkSettings, PipelineError, ServiceError, SummarizeRequest, SummaryApi};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Build the HTTP router exposing the summarization API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: SummaryApi + 'static,
{
    Router::new()
        .route("/", get(read_root))
        .route("/health", get(health::<S>))
        .route("/split", post(split_document::<S>))
        .route("/summarize", post(summarize_document::<S>))
        .route("/history", get(list_history::<S>))
        .route(
            "/history/:id",
            get(get_history_record::<S>).delete(delete_history::<S>),
        )
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

async fn read_root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Welcome to MMSummary API" }))
}

async fn health<S>(State(service): State<Arc<S>>) -> Result<Json<serde_json::Value>, AppError>
where
    S: SummaryApi,
{
    service.health().await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// Request body for the `POST /split` endpoint.
#[derive(Deserialize)]
struct SplitRequest {
    text: String,
    #[serde(default = "default_split_chunk_size")]
    chunk_size: usize,
    #[serde(default = "default_split_chunk_overlap")]
    chunk_overlap: usize,
    /// Model whose tokenizer measures the chunks.
    #[serde(default)]
    model: Option<String>,
}

fn default_split_chunk_size() -> usize {
    SummarizeRequest::default().chunk_size_1
}

fn default_split_chunk_overlap() -> usize {
    SummarizeRequest::default().chunk_overlap_1
}

/// Success response for the `POST /split` endpoint.
#[derive(Serialize)]
struct SplitResponse {
    chunks: Vec<String>,
    total_chunks: usize,
}

async fn split_document<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<SplitRequest>,
) -> Result<Json<SplitResponse>, AppError>
where
    S: SummaryApi,
{
    let settings = ChunkSettings::new(request.chunk_size, request.chunk_overlap);
    let chunks: Vec<String> = service
        .split(&request.text, settings, request.model.as_deref())?
        .into_iter()
        .map(|chunk| chunk.content)
        .collect();
    tracing::debug!(chunks = chunks.len(), "Split request completed");
    Ok(Json(SplitResponse {
        total_chunks: chunks.len(),
        chunks,
    }))
}

/// Request body for the `POST /summarize` endpoint.
///
/// Every field except `text` is optional; `map_temple`/`reduce_temple` are accepted as legacy
/// spellings of the template overrides.
#[derive(Deserialize)]
#[serde(default)]
struct SummarizeBody {
    text: String,
    chunk_size_1: usize,
    chunk_overlap_1: usize,
    chunk_size_2: usize,
    chunk_overlap_2: usize,
    token_max: usize,
    temperature: f32,
    reduce_temperature: f32,
    model: String,
    use_map: bool,
    test_mode: bool,
    #[serde(alias = "map_temple")]
    map_template: Option<String>,
    #[serde(alias = "reduce_temple")]
    reduce_template: Option<String>,
    language: String,
    max_collapse_rounds: usize,
}

impl Default for SummarizeBody {
    fn default() -> Self {
        SummarizeRequest::default().into()
    }
}

impl From<SummarizeRequest> for SummarizeBody {
    fn from(request: SummarizeRequest) -> Self {
        Self {
            text: request.text,
            chunk_size_1: request.chunk_size_1,
            chunk_overlap_1: request.chunk_overlap_1,
            chunk_size_2: request.chunk_size_2,
            chunk_overlap_2: request.chunk_overlap_2,
            token_max: request.token_max,
            temperature: request.temperature,
            reduce_temperature: request.reduce_temperature,
            model: request.model,
            use_map: request.use_map,
            test_mode: request.test_mode,
            map_template: request.map_template,
            reduce_template: request.reduce_template,
            language: request.language,
            max_collapse_rounds: request.max_collapse_rounds,
        }
    }
}

impl From<SummarizeBody> for SummarizeRequest {
    fn from(body: SummarizeBody) -> Self {
        Self {
            text: body.text,
            chunk_size_1: body.chunk_size_1,
            chunk_overlap_1: body.chunk_overlap_1,
            chunk_size_2: body.chunk_size_2,
            chunk_overlap_2: body.chunk_overlap_2,
            token_max: body.token_max,
            temperature: body.temperature,
            reduce_temperature: body.reduce_temperature,
            model: body.model,
            use_map: body.use_map,
            test_mode: body.test_mode,
            map_template: body.map_template,
            reduce_template: body.reduce_template,
            language: body.language,
            max_collapse_rounds: body.max_collapse_rounds,
        }
    }
}

/// Success response for the `POST /summarize` endpoint.
#[derive(Serialize)]
struct SummarizeResponse {
    summary: String,
    processing_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    history_id: Option<String>,
}

async fn summarize_document<S>(
    State(service): State<Arc<S>>,
    Json(body): Json<SummarizeBody>,
) -> Result<Json<SummarizeResponse>, AppError>
where
    S: SummaryApi,
{
    let outcome = service.summarize(body.into()).await?;
    tracing::info!(
        processing_time = outcome.processing_time,
        model_calls = outcome.stats.model_calls,
        history_id = outcome.history_id.as_deref().unwrap_or("-"),
        "Summarize request completed"
    );
    Ok(Json(SummarizeResponse {
        summary: outcome.summary,
        processing_time: outcome.processing_time,
        history_id: outcome.history_id,
    }))
}

async fn list_history<S>(
    State(service): State<Arc<S>>,
) -> Result<Json<Vec<HistoryRecord>>, AppError>
where
    S: SummaryApi,
{
    Ok(Json(service.history().await?))
}

async fn get_history_record<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<Json<HistoryRecord>, AppError>
where
    S: SummaryApi,
{
    Ok(Json(service.history_record(&id).await?))
}

async fn delete_history<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError>
where
    S: SummaryApi,
{
    service.delete_history(&id).await?;
    Ok(Json(json!({ "status": "deleted", "id": id })))
}

/// Return the run counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsResponse>
where
    S: SummaryApi,
{
    let snapshot = service.metrics_snapshot();
    Json(MetricsResponse {
        runs_completed: snapshot.runs_completed,
        runs_failed: snapshot.runs_failed,
        model_calls: snapshot.model_calls,
        last_processing_time: snapshot.last_processing_time,
    })
}

/// Response body for `GET /metrics`.
#[derive(Serialize)]
struct MetricsResponse {
    runs_completed: u64,
    runs_failed: u64,
    model_calls: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_processing_time: Option<f64>,
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "summarize",
                method: "POST",
                path: "/summarize",
                description: "Summarize a long transcript with two chunking passes, a map stage, and a token-budgeted reduce. Response returns { \"summary\": string, \"processing_time\": number, \"history_id\": string }.",
                request_example: Some(json!({
                    "text": "Meeting transcript",
                    "chunk_size_1": 16000,
                    "chunk_overlap_1": 4000,
                    "chunk_size_2": 8000,
                    "chunk_overlap_2": 0,
                    "token_max": 16000,
                    "model": "gpt-5-mini",
                    "use_map": true,
                    "language": "Traditional Chinese"
                })),
            },
            CommandDescriptor {
                name: "split",
                method: "POST",
                path: "/split",
                description: "Split text into overlapping token-sized chunks without calling a model.",
                request_example: Some(json!({
                    "text": "Meeting transcript",
                    "chunk_size": 16000,
                    "chunk_overlap": 4000
                })),
            },
            CommandDescriptor {
                name: "history",
                method: "GET",
                path: "/history",
                description: "Return the most recent summarization runs, newest first.",
                request_example: None,
            },
            CommandDescriptor {
                name: "history_record",
                method: "GET",
                path: "/history/{id}",
                description: "Return one stored summarization run.",
                request_example: None,
            },
            CommandDescriptor {
                name: "delete_history",
                method: "DELETE",
                path: "/history/{id}",
                description: "Delete one stored summarization run.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return run counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

struct AppError(ServiceError);

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ServiceError::Pipeline(error) => pipeline_status(error),
            ServiceError::History(HistoryError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServiceError::History(HistoryError::InvalidId(_)) => StatusCode::BAD_REQUEST,
            ServiceError::History(HistoryError::Timestamp(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn pipeline_status(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::EmptyInput | PipelineError::InvalidConfiguration(_) => {
            StatusCode::BAD_REQUEST
        }
        PipelineError::TokenBudgetExceeded { .. }
        | PipelineError::ReduceStalled { .. }
        | PipelineError::CollapseLimitReached { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        PipelineError::SummarizationFailure { source, .. } | PipelineError::Model(source) => {
            model_status(source)
        }
        PipelineError::Tokenizer { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn model_status(error: &ModelError) -> StatusCode {
    match error {
        ModelError::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
        ModelError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        ModelError::ModelUnavailable(_) | ModelError::InvalidResponse(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, status = status.as_u16(), "Request failed");
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(inner: ServiceError) -> Self {
        Self(inner)
    }
}
