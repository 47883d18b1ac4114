//! Admin statistics endpoints.

use crate::auth::AdminUser;
use crate::error::ApiResult;
use crate::state::AppState;
use crate::stats::{DailySeries, PlatformBreakdown, Summary};
use axum::Json;
use axum::extract::State;

/// GET /api/stats/downloads
pub async fn download_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<DailySeries>> {
    Ok(Json(state.stats.downloads_per_day().await?))
}

/// GET /api/stats/users - Registrations per day.
pub async fn user_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<DailySeries>> {
    Ok(Json(state.stats.registrations_per_day().await?))
}

/// GET /api/stats/platforms
pub async fn platform_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<PlatformBreakdown>> {
    Ok(Json(state.stats.platform_breakdown().await?))
}

/// GET /api/stats/access
pub async fn access_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<DailySeries>> {
    Ok(Json(state.stats.access_per_day().await?))
}

/// GET /api/stats/summary
pub async fn summary_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Summary>> {
    Ok(Json(state.stats.summary().await?))
}
