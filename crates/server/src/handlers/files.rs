//! Artifact file serving and health check.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use portal_core::{ARTIFACT_PREFIX, artifact_file_name, sanitize_file_name};
use portal_storage::StorageError;
use serde::Serialize;

/// GET /files/{*key} - Stream a stored artifact as an attachment.
pub async fn get_file(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult<Response> {
    if !key.starts_with(ARTIFACT_PREFIX) {
        return Err(ApiError::NotFound("file".to_string()));
    }

    let meta = match state.storage.head(&key).await {
        Ok(meta) => meta,
        Err(StorageError::NotFound(_) | StorageError::InvalidKey(_)) => {
            return Err(ApiError::NotFound("file".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let stream = state.storage.get_stream(&key).await?;
    let body_stream = stream.map(|result| result.map_err(|e| std::io::Error::other(e.to_string())));

    let file_name = artifact_file_name(&key)
        .map(sanitize_file_name)
        .unwrap_or_else(|| "download".to_string());
    let disposition = format!("attachment; filename=\"{file_name}\"");
    let length = meta.size.to_string();

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, "application/octet-stream"),
            (CONTENT_LENGTH, length.as_str()),
            (CONTENT_DISPOSITION, disposition.as_str()),
        ],
        Body::from_stream(body_stream),
    )
        .into_response())
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /api/health - Health check.
///
/// Intentionally unauthenticated for load balancers and probes. Returns only
/// non-sensitive information.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.metadata.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}
