//! Version endpoints: listing, publishing and download resolution.

use super::common::record_access;
use crate::artifacts::{platform_urls, read_upload_form};
use crate::auth::{AdminUser, MaybeUser};
use crate::client::ClientInfo;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::registry::{Downloader, Version, validate_label};
use crate::state::AppState;
use axum::Json;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct ListVersionsParams {
    pub limit: Option<u32>,
}

/// GET /api/versions - Newest releases first.
pub async fn list_versions(
    State(state): State<AppState>,
    query: Result<Query<ListVersionsParams>, QueryRejection>,
) -> ApiResult<Json<Vec<Version>>> {
    let Query(params) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Json(state.registry.list(params.limit).await?))
}

#[derive(Debug, Serialize)]
pub struct CreateVersionResponse {
    pub message: &'static str,
    pub version: Version,
}

/// POST /api/versions - Publish a release with up to three platform files.
///
/// Nothing is persisted unless every file was stored and the version row
/// was written.
pub async fn create_version(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    client: ClientInfo,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<CreateVersionResponse>)> {
    let result = match multipart {
        Ok(multipart) => publish(&state, multipart).await,
        Err(e) => Err(ApiError::InvalidUpload(e.body_text())),
    };

    match result {
        Ok(version) => {
            metrics::record_upload("success");
            record_access(
                &state,
                Some(admin.id),
                &client,
                "upload_version",
                StatusCode::CREATED,
                Some(format!("version={}", version.version)),
            )
            .await;
            Ok((
                StatusCode::CREATED,
                Json(CreateVersionResponse {
                    message: "version published",
                    version,
                }),
            ))
        }
        Err(e) => {
            let status = e.status_code();
            metrics::record_upload(if status.is_client_error() {
                "rejected"
            } else {
                "failed"
            });
            let details = match &e {
                ApiError::InvalidUpload(msg) | ApiError::BadRequest(msg) => Some(msg.clone()),
                _ => None,
            };
            record_access(&state, Some(admin.id), &client, "upload_version", status, details)
                .await;
            Err(e)
        }
    }
}

async fn publish(state: &AppState, multipart: Multipart) -> ApiResult<Version> {
    let form = read_upload_form(multipart, state.config.server.max_upload_bytes).await?;
    let label = validate_label(&form.version)?;
    tracing::debug!(
        version = %label,
        files = form.files.len(),
        bytes = form.total_bytes(),
        "Upload form accepted"
    );

    let stored = state.uploads.store_all(form.files).await?;
    match state
        .registry
        .create(&label, &form.description, &platform_urls(&stored))
        .await
    {
        Ok(version) => Ok(version),
        Err(e) => {
            tracing::error!(version = %label, error = %e, "Version row not written, removing artifacts");
            state.uploads.discard(&stored).await;
            Err(e)
        }
    }
}

/// GET /api/download/{version_id}/{platform} - Redirect to the artifact URL.
pub async fn download(
    State(state): State<AppState>,
    Path((version_id, platform)): Path<(String, String)>,
    MaybeUser(user): MaybeUser,
    client: ClientInfo,
) -> ApiResult<Response> {
    let url = state
        .registry
        .resolve_download(
            &version_id,
            &platform,
            Downloader {
                user_id: user.map(|u| u.id),
                ip: client.ip,
                user_agent: client.user_agent,
            },
        )
        .await?;

    let location = HeaderValue::from_str(&url)
        .map_err(|e| ApiError::Internal(format!("stored URL is not a valid header: {e}")))?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}
