//! HTTP surface: conversion, artifact download and health check.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::download::AudioDownloader;
use crate::error::{DelegateError, Error};
use crate::janitor;
use crate::store::ArtifactStore;
use crate::types::{ConvertedAudio, Quality};

/// Name the client sees when saving a downloaded artifact.
pub const DOWNLOAD_FILENAME: &str = "audio.mp3";

const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Shared handles injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ArtifactStore>,
    pub downloader: Arc<dyn AudioDownloader>,
    /// Age threshold for the cleanup pass that follows each conversion.
    pub max_age: Duration,
}

impl AppState {
    pub fn new(
        store: Arc<ArtifactStore>,
        downloader: Arc<dyn AudioDownloader>,
        max_age: Duration,
    ) -> Self {
        Self {
            store,
            downloader,
            max_age,
        }
    }
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/convert", post(convert))
        .route("/api/download/{filename}", get(download))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Request / response types
// ============================================================================

/// Raw body of `POST /api/convert`, validated into a [`ConversionRequest`].
#[derive(Debug, Default, Deserialize)]
pub struct ConvertPayload {
    #[serde(default)]
    pub url: Option<String>,
    /// `"128" | "192" | "320"`, or the same values as numbers.
    #[serde(default)]
    pub quality: Option<serde_json::Value>,
}

/// A validated conversion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub url: String,
    pub quality: Quality,
}

impl TryFrom<ConvertPayload> for ConversionRequest {
    type Error = Error;

    fn try_from(payload: ConvertPayload) -> Result<Self, Self::Error> {
        let url = payload.url.as_deref().map(str::trim).unwrap_or_default();
        if url.is_empty() {
            return Err(Error::InvalidRequest("url is required".into()));
        }

        let quality = match &payload.quality {
            None => Quality::default(),
            Some(value) => Quality::from_json(value)?,
        };

        Ok(Self {
            url: url.to_string(),
            quality,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct AudioInfo {
    pub title: String,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub status: String,
    pub message: String,
    pub download_url: String,
    pub filename: String,
    pub info: AudioInfo,
}

impl From<ConvertedAudio> for ConvertResponse {
    fn from(audio: ConvertedAudio) -> Self {
        Self {
            status: "success".into(),
            message: "Conversion successful".into(),
            download_url: format!("/api/download/{}", audio.filename),
            filename: audio.filename,
            info: AudioInfo {
                title: audio.title,
                thumbnail: audio.thumbnail,
                duration: audio.duration,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

// ============================================================================
// Errors
// ============================================================================

/// Error returned by handlers, rendered as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::InvalidQuality(_) | Error::InvalidRequest(_) | Error::InvalidFilename(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, e.to_string())
            }
            Error::ArtifactNotFound { .. } => ApiError::new(StatusCode::NOT_FOUND, "File not found"),
            other => {
                error!(error = %other, "request failed");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

/// Every delegate failure is reported as a bad request, whichever class it is.
impl From<DelegateError> for ApiError {
    fn from(e: DelegateError) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Validate, convert, respond, then schedule a cleanup pass.
async fn convert(
    State(state): State<AppState>,
    payload: Result<Json<ConvertPayload>, JsonRejection>,
) -> Result<Json<ConvertResponse>, ApiError> {
    let Json(payload) = payload?;
    let request = ConversionRequest::try_from(payload).inspect_err(|e| {
        warn!(error = %e, "rejected conversion request");
    })?;

    let audio = state
        .downloader
        .download_audio(&request.url, request.quality)
        .await?;

    info!(url = %request.url, filename = %audio.filename, "conversion ready");
    let response = ConvertResponse::from(audio);

    tokio::spawn(janitor::cleanup_pass(Arc::clone(&state.store), state.max_age));

    Ok(Json(response))
}

/// Stream a stored artifact back to the client.
async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let (path, file) = state.store.open(&filename).await?;
    let len = file.metadata().await.map_err(Error::from)?.len();
    debug!(path = %path.display(), bytes = len, "serving artifact");

    let body = Body::from_stream(ReaderStream::new(file));
    let disposition = format!("attachment; filename=\"{DOWNLOAD_FILENAME}\"");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(AUDIO_CONTENT_TYPE)),
            (
                header::CONTENT_DISPOSITION,
                HeaderValue::from_str(&disposition)
                    .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
            ),
            (header::CONTENT_LENGTH, HeaderValue::from(len)),
        ],
        body,
    )
        .into_response())
}
