//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Accounts
// =============================================================================

/// Registered user. `password_hash` never leaves the server.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    /// Case-sensitive, unique.
    pub username: String,
    /// Lowercased, unique.
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub last_login: Option<OffsetDateTime>,
    pub login_count: i64,
    pub created_at: OffsetDateTime,
}

/// Insert payload for a user. The id is assigned by the database.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: OffsetDateTime,
}

/// Server-side login session. Only the SHA-256 of the cookie value is stored.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub session_id: Uuid,
    pub token_hash: String,
    pub user_id: i64,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

// =============================================================================
// Releases
// =============================================================================

/// Released version with its per-platform artifact URLs.
#[derive(Debug, Clone, FromRow)]
pub struct VersionRow {
    pub id: i64,
    pub version: String,
    pub description: String,
    pub windows_url: Option<String>,
    pub mac_url: Option<String>,
    pub linux_url: Option<String>,
    pub download_count: i64,
    pub created_at: OffsetDateTime,
}

/// Insert payload for a version. The counter always starts at zero.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub version: String,
    pub description: String,
    pub windows_url: Option<String>,
    pub mac_url: Option<String>,
    pub linux_url: Option<String>,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Event logs (append-only)
// =============================================================================

/// One resolved download.
#[derive(Debug, Clone, FromRow)]
pub struct DownloadEventRow {
    pub id: i64,
    /// Null when the version has since been deleted.
    pub version_id: Option<i64>,
    pub platform: String,
    pub user_id: Option<i64>,
    pub ip: String,
    pub user_agent: String,
    pub downloaded_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewDownloadEvent {
    pub version_id: Option<i64>,
    pub platform: String,
    pub user_id: Option<i64>,
    pub ip: String,
    pub user_agent: String,
    pub downloaded_at: OffsetDateTime,
}

/// One audited request (login, registration, upload...).
#[derive(Debug, Clone, FromRow)]
pub struct AccessEventRow {
    pub id: i64,
    pub user_id: Option<i64>,
    pub ip: String,
    pub user_agent: String,
    pub action: String,
    pub status: i64,
    pub details: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewAccessEvent {
    pub user_id: Option<i64>,
    pub ip: String,
    pub user_agent: String,
    pub action: String,
    pub status: i64,
    pub details: Option<String>,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Aggregates
// =============================================================================

/// Event count for one UTC calendar day (`YYYY-MM-DD`).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DailyCount {
    pub day: String,
    pub count: i64,
}

/// Download count for one stored platform value.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PlatformCount {
    pub platform: String,
    pub count: i64,
}
