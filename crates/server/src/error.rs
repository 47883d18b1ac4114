//! API error types.

use axum::Json;
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use portal_metadata::MetadataError;
use portal_storage::StorageError;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("too many requests, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata error: {0}")]
    Metadata(MetadataError),

    #[error("{0}")]
    Core(#[from] portal_core::Error),
}

impl From<MetadataError> for ApiError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::AlreadyExists(what) => Self::Conflict(what),
            MetadataError::NotFound(what) => Self::NotFound(what),
            other => Self::Metadata(other),
        }
    }
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::InvalidUpload(_) => "invalid_upload",
            Self::RateLimited { .. } => "rate_limited",
            Self::UploadFailed(_) => "upload_failed",
            Self::Internal(_) | Self::Metadata(_) => "internal_error",
            Self::Storage(StorageError::NotFound(_)) => "not_found",
            Self::Storage(_) => "internal_error",
            Self::Core(_) => "bad_request",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::Conflict(_) | Self::InvalidUpload(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UploadFailed(_) | Self::Internal(_) | Self::Metadata(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message safe to show a client. Server-side failures are replaced by a
    /// generic text and logged instead.
    fn public_message(&self) -> String {
        match self {
            Self::NotFound(what) => format!("{what} not found"),
            Self::BadRequest(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::Conflict(msg)
            | Self::InvalidUpload(msg) => msg.clone(),
            Self::Core(e) => e.to_string(),
            Self::RateLimited { retry_after_secs } => {
                format!("too many requests, retry after {retry_after_secs} seconds")
            }
            Self::Storage(StorageError::NotFound(_)) => "file not found".to_string(),
            Self::UploadFailed(_) => "upload failed".to_string(),
            Self::Internal(_) | Self::Metadata(_) | Self::Storage(_) => {
                "internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }

        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.public_message(),
        };
        let mut response = (status, Json(body)).into_response();

        if let Self::RateLimited { retry_after_secs } = self
            && let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        response
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn duplicate_rows_map_to_conflict() {
        let err: ApiError = MetadataError::AlreadyExists("username".to_string()).into();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn missing_rows_map_to_not_found() {
        let err: ApiError = MetadataError::NotFound("version 7".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let err = ApiError::Metadata(MetadataError::Internal("disk on fire".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["code"], "internal_error");
        assert_eq!(body["message"], "internal server error");
        assert!(!body.to_string().contains("disk on fire"));
    }

    #[tokio::test]
    async fn upload_failures_are_generic() {
        let response = ApiError::UploadFailed("s3 timeout".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["code"], "upload_failed");
        assert_eq!(body["message"], "upload failed");
    }

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited {
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "42");
    }

    #[test]
    fn core_validation_errors_are_bad_requests() {
        let err: ApiError = portal_core::Error::InvalidUsername("has space".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "bad_request");
    }
}
