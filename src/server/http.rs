//! HTTP routes
//!
//! - `POST /probe`: download the posted URL and return `ffprobe` JSON
//! - `GET /health`: liveness probe with no dependencies
//!
//! Every error response has the shape `{"detail": "<message>"}`.

use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use super::connect_info::ClientAddr;
use crate::media::{ProbeError, ProbeFailure, ProbePipeline};

/// Shared router state. Immutable after startup.
#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: ProbePipeline,
}

impl AppState {
    pub fn new(pipeline: ProbePipeline) -> Self {
        Self { pipeline }
    }
}

/// Body of `POST /probe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub url: String,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Error response carrying an HTTP status and a human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn unprocessable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, detail)
    }
}

impl From<ProbeError> for ApiError {
    fn from(err: ProbeError) -> Self {
        let status = match err.failure() {
            ProbeFailure::BadInput => StatusCode::BAD_REQUEST,
            ProbeFailure::AnalyzerUnavailable
            | ProbeFailure::OutputParse
            | ProbeFailure::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::unprocessable(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/probe", post(probe_handler))
        .route("/health", get(health_handler))
        .fallback(not_found)
        .with_state(state)
}

/// Accept only absolute `http`/`https` URLs with a host.
pub fn parse_probe_url(raw: &str) -> Result<Url, ApiError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ApiError::unprocessable(format!("invalid URL {raw:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::unprocessable(format!(
            "URL scheme should be 'http' or 'https', got {:?}",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ApiError::unprocessable("URL must include a host"));
    }
    Ok(url)
}

async fn probe_handler(
    State(state): State<AppState>,
    ClientAddr(peer): ClientAddr,
    payload: Result<Json<ProbeRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let url = parse_probe_url(&request.url)?;

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("probe", %request_id, url = %url, peer = ?peer);

    async move {
        let started = Instant::now();
        match state.pipeline.run(&url).await {
            Ok(result) => {
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "probe succeeded"
                );
                Ok(Json(result))
            }
            Err(err) => {
                let api = ApiError::from(err);
                if api.status.is_server_error() {
                    tracing::error!(status = api.status.as_u16(), detail = %api.detail, "probe failed");
                } else {
                    tracing::warn!(status = api.status.as_u16(), detail = %api.detail, "probe failed");
                }
                Err(api)
            }
        }
    }
    .instrument(span)
    .await
}

/// Health check handler - no dependency on the analyzer or network.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Not Found")
}
