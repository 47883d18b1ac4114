//! Account endpoints: registration, login, logout and admin check.

use super::common::{parse_json, record_access};
use crate::accounts::User;
use crate::auth::{MaybeUser, clear_session_cookie, read_cookie, session_cookie};
use crate::client::ClientInfo;
use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use portal_core::UserId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user_id: UserId,
}

/// POST /api/register - Create an account.
pub async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let result = match parse_json::<RegisterRequest>(&body) {
        Ok(req) => {
            state
                .credentials
                .register(&req.username, &req.password, &req.email)
                .await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(user_id) => {
            metrics::REGISTRATIONS.inc();
            record_access(&state, Some(user_id), &client, "register", StatusCode::CREATED, None)
                .await;
            Ok((
                StatusCode::CREATED,
                Json(RegisterResponse {
                    message: "registration successful",
                    user_id,
                }),
            ))
        }
        Err(e) => {
            record_access(&state, None, &client, "register", e.status_code(), None).await;
            Err(e)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub user: User,
}

/// POST /api/login - Verify credentials and open a session.
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    body: Bytes,
) -> ApiResult<Response> {
    let req: LoginRequest = parse_json(&body)?;

    let user = match state.credentials.authenticate(&req.username, &req.password).await {
        Ok(user) => user,
        Err(e) => {
            metrics::record_login(false);
            record_access(
                &state,
                None,
                &client,
                "login",
                e.status_code(),
                Some(format!("username={}", req.username.trim())),
            )
            .await;
            return Err(e);
        }
    };

    let session = state.sessions.create(user.id).await?;
    metrics::record_login(true);
    record_access(&state, Some(user.id), &client, "login", StatusCode::OK, None).await;
    tracing::info!(user_id = %user.id, "Login succeeded");

    let cookie = session_cookie(&state.config.auth, &session.token);
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            message: "login successful",
            user,
        }),
    )
        .into_response())
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// POST /api/logout - Revoke the current session. Idempotent.
pub async fn logout(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    client: ClientInfo,
    headers: HeaderMap,
) -> ApiResult<Response> {
    if let Some(token) = read_cookie(&headers, &state.config.auth.cookie_name) {
        state.sessions.revoke(token).await?;
    }
    record_access(
        &state,
        user.map(|u| u.id),
        &client,
        "logout",
        StatusCode::OK,
        None,
    )
    .await;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie(&state.config.auth))],
        Json(MessageResponse {
            message: "logged out",
        }),
    )
        .into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckAdminResponse {
    pub is_admin: bool,
    pub user: Option<User>,
}

/// GET /api/check-admin - Report the caller's admin status. Never fails for
/// anonymous callers.
pub async fn check_admin(MaybeUser(user): MaybeUser) -> Json<CheckAdminResponse> {
    Json(CheckAdminResponse {
        is_admin: user.as_ref().is_some_and(|u| u.is_admin),
        user,
    })
}
