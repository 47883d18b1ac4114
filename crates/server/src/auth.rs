//! Session authority and authorization extractors.
//!
//! Sessions are server-side: the client holds an opaque random token in an
//! HTTP-only cookie and the store holds only its SHA-256 digest. Every request
//! re-reads the user row, so revoking admin rights takes effect immediately.

use crate::accounts::User;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use portal_core::UserId;
use portal_core::config::AuthConfig;
use portal_metadata::MetadataStore;
use portal_metadata::models::SessionRow;
use portal_metadata::repos::{SessionRepo, UserRepo};
use sha2::{Digest, Sha256};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and potential log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Random bytes in a session token.
const SESSION_TOKEN_BYTES: usize = 32;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value.
    /// Truncated to MAX_TRACE_ID_LEN characters with non-printable characters removed.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic())
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A freshly issued session. `token` goes to the client and is never stored.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// Issues, resolves and revokes login sessions.
pub struct SessionAuthority {
    metadata: Arc<dyn MetadataStore>,
    ttl: time::Duration,
}

impl SessionAuthority {
    pub fn new(metadata: Arc<dyn MetadataStore>, ttl: time::Duration) -> Self {
        Self { metadata, ttl }
    }

    /// Start a session for `user_id` with an absolute expiry.
    pub async fn create(&self, user_id: UserId) -> ApiResult<IssuedSession> {
        let token = generate_session_token();
        let now = OffsetDateTime::now_utc();
        let expires_at = now + self.ttl;

        self.metadata
            .create_session(&SessionRow {
                session_id: Uuid::new_v4(),
                token_hash: hash_session_token(&token),
                user_id: user_id.as_i64(),
                created_at: now,
                expires_at,
            })
            .await?;

        Ok(IssuedSession { token, expires_at })
    }

    /// Resolve a cookie value to its user. Unknown, expired or orphaned
    /// sessions resolve to `None`.
    pub async fn resolve(&self, token: &str) -> ApiResult<Option<User>> {
        let token_hash = hash_session_token(token);
        let Some(session) = self.metadata.get_session_by_hash(&token_hash).await? else {
            return Ok(None);
        };

        if session.expires_at <= OffsetDateTime::now_utc() {
            if let Err(e) = self.metadata.delete_session_by_hash(&token_hash).await {
                tracing::warn!(error = %e, "Failed to delete expired session");
            }
            return Ok(None);
        }

        Ok(self.metadata.get_user(session.user_id).await?.map(User::from))
    }

    /// End the session behind `token`. Returns whether one existed.
    pub async fn revoke(&self, token: &str) -> ApiResult<bool> {
        Ok(self
            .metadata
            .delete_session_by_hash(&hash_session_token(token))
            .await?)
    }

    /// Delete every expired session.
    pub async fn sweep_expired(&self) -> ApiResult<u64> {
        Ok(self
            .metadata
            .delete_expired_sessions(OffsetDateTime::now_utc())
            .await?)
    }
}

/// 32 random bytes, base64url without padding.
fn generate_session_token() -> String {
    let bytes: [u8; SESSION_TOKEN_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a session token for storage lookup.
pub fn hash_session_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// `Set-Cookie` value carrying a new session.
pub fn session_cookie(config: &AuthConfig, token: &str) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.cookie_name, token, config.session_ttl_secs
    );
    if config.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_session_cookie(config: &AuthConfig) -> String {
    let mut cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        config.cookie_name
    );
    if config.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Read the cookie `name` from all `Cookie` headers.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value)
}

/// Extract trace ID from X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// Trace middleware: runs the rest of the stack inside a `request` span
/// carrying the caller's `X-Trace-Id` or a fresh one.
pub async fn trace_id_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(&req);
    let span = tracing::info_span!("request", trace_id = %trace_id);
    req.extensions_mut().insert(trace_id);
    next.run(req).instrument(span).await
}

/// Session middleware: resolves the session cookie into a [`CurrentUser`]
/// extension. Requests without a valid session stay anonymous.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = read_cookie(req.headers(), &state.config.auth.cookie_name).map(str::to_string);
    if let Some(token) = token
        && let Some(user) = state.sessions.resolve(&token).await?
    {
        req.extensions_mut().insert(CurrentUser(user));
    }

    Ok(next.run(req).await)
}

/// Spawn a background task that periodically deletes expired sessions.
pub fn spawn_session_sweeper(
    sessions: Arc<SessionAuthority>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match sessions.sweep_expired().await {
                Ok(0) => {}
                Ok(swept) => {
                    metrics::SESSIONS_SWEPT.inc_by(swept);
                    tracing::info!(swept, "Expired sessions deleted");
                }
                Err(e) => tracing::warn!(error = %e, "Session sweep failed"),
            }
        }
    })
}

/// The authenticated caller. Rejects anonymous requests with 401.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

/// An authenticated administrator. 401 when anonymous, 403 when not admin.
#[derive(Clone, Debug)]
pub struct AdminUser(pub User);

/// The caller if a session is present. Never rejects.
#[derive(Clone, Debug)]
pub struct MaybeUser(pub Option<User>);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(ApiError::Forbidden(
                "administrator privileges required".to_string(),
            ));
        }
        Ok(AdminUser(user))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts.extensions.get::<CurrentUser>().map(|c| c.0.clone()),
        ))
    }
}
