//! Shared handler helpers.

use crate::client::ClientInfo;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::http::StatusCode;
use bytes::Bytes;
use portal_core::UserId;
use portal_metadata::models::NewAccessEvent;
use portal_metadata::repos::EventRepo;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;

/// Decode a JSON request body, mapping every failure to `BadRequest`.
pub fn parse_json<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

/// Append an access event. Failures are logged and swallowed.
pub async fn record_access(
    state: &AppState,
    user_id: Option<UserId>,
    client: &ClientInfo,
    action: &str,
    status: StatusCode,
    details: Option<String>,
) {
    let event = NewAccessEvent {
        user_id: user_id.map(|id| id.as_i64()),
        ip: client.ip.clone(),
        user_agent: client.user_agent.clone(),
        action: action.to_string(),
        status: i64::from(status.as_u16()),
        details,
        created_at: OffsetDateTime::now_utc(),
    };
    if let Err(e) = state.metadata.record_access(&event).await {
        tracing::warn!(action, error = %e, "Failed to record access event");
    }
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("route".to_string())
}
