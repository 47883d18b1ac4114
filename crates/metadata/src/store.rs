//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult, is_unique_violation};
use crate::timestamp::db_timestamp;
use crate::repos::{EventRepo, SessionRepo, StatsRepo, UserRepo, VersionRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    UserRepo + SessionRepo + VersionRepo + EventRepo + StatsRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub async fn new(path: impl AsRef<Path>, max_connections: u32) -> MetadataResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;

    #[async_trait]
    impl UserRepo for SqliteStore {
        async fn create_user(&self, user: &NewUser) -> MetadataResult<i64> {
            let result = sqlx::query(
                r#"
                INSERT INTO users (
                    username, email, password_hash, is_admin, login_count, created_at
                ) VALUES (?, ?, ?, ?, 0, ?)
                "#,
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.is_admin)
            .bind(db_timestamp(user.created_at)?)
            .execute(&self.pool)
            .await;

            match result {
                Ok(done) => Ok(done.last_insert_rowid()),
                Err(e) if is_unique_violation(&e, "users.username") => Err(
                    MetadataError::AlreadyExists(format!("username '{}'", user.username)),
                ),
                Err(e) if is_unique_violation(&e, "users.email") => Err(
                    MetadataError::AlreadyExists(format!("email '{}'", user.email)),
                ),
                Err(e) => Err(e.into()),
            }
        }

        async fn get_user(&self, id: i64) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_user_by_username(&self, username: &str) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn record_login(&self, id: i64, at: OffsetDateTime) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE users SET last_login = ?, login_count = login_count + 1 WHERE id = ?",
            )
            .bind(db_timestamp(at)?)
            .bind(id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("user {id}")));
            }
            Ok(())
        }

        async fn set_admin(&self, id: i64, is_admin: bool) -> MetadataResult<()> {
            let result = sqlx::query("UPDATE users SET is_admin = ? WHERE id = ?")
                .bind(is_admin)
                .bind(id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("user {id}")));
            }
            Ok(())
        }

        async fn update_password_hash(&self, id: i64, password_hash: &str) -> MetadataResult<()> {
            let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
                .bind(password_hash)
                .bind(id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("user {id}")));
            }
            Ok(())
        }

        async fn count_users(&self) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
                .fetch_one(&self.pool)
                .await?;
            Ok(count as u64)
        }
    }

    #[async_trait]
    impl SessionRepo for SqliteStore {
        async fn create_session(&self, session: &SessionRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO sessions (session_id, token_hash, user_id, created_at, expires_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(session.session_id)
            .bind(&session.token_hash)
            .bind(session.user_id)
            .bind(db_timestamp(session.created_at)?)
            .bind(db_timestamp(session.expires_at)?)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_session_by_hash(
            &self,
            token_hash: &str,
        ) -> MetadataResult<Option<SessionRow>> {
            let row =
                sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE token_hash = ?")
                    .bind(token_hash)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn delete_session_by_hash(&self, token_hash: &str) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
                .bind(token_hash)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn delete_expired_sessions(&self, now: OffsetDateTime) -> MetadataResult<u64> {
            let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
                .bind(db_timestamp(now)?)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }
    }

    #[async_trait]
    impl VersionRepo for SqliteStore {
        async fn create_version(&self, version: &NewVersion) -> MetadataResult<VersionRow> {
            let result = sqlx::query(
                r#"
                INSERT INTO versions (
                    version, description, windows_url, mac_url, linux_url,
                    download_count, created_at
                ) VALUES (?, ?, ?, ?, ?, 0, ?)
                "#,
            )
            .bind(&version.version)
            .bind(&version.description)
            .bind(&version.windows_url)
            .bind(&version.mac_url)
            .bind(&version.linux_url)
            .bind(db_timestamp(version.created_at)?)
            .execute(&self.pool)
            .await?;

            let id = result.last_insert_rowid();
            self.get_version(id).await?.ok_or_else(|| {
                MetadataError::Internal(format!("version {id} missing after insert"))
            })
        }

        async fn get_version(&self, id: i64) -> MetadataResult<Option<VersionRow>> {
            let row = sqlx::query_as::<_, VersionRow>("SELECT * FROM versions WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_versions(&self, limit: u32) -> MetadataResult<Vec<VersionRow>> {
            let rows = sqlx::query_as::<_, VersionRow>(
                "SELECT * FROM versions ORDER BY created_at DESC, id DESC LIMIT ?",
            )
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn increment_download_count(&self, id: i64) -> MetadataResult<()> {
            let result =
                sqlx::query("UPDATE versions SET download_count = download_count + 1 WHERE id = ?")
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("version {id}")));
            }
            Ok(())
        }

        async fn count_versions(&self) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM versions")
                .fetch_one(&self.pool)
                .await?;
            Ok(count as u64)
        }
    }

    #[async_trait]
    impl EventRepo for SqliteStore {
        async fn record_download(&self, event: &NewDownloadEvent) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO download_stats (
                    version_id, platform, user_id, ip, user_agent, downloaded_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(event.version_id)
            .bind(&event.platform)
            .bind(event.user_id)
            .bind(&event.ip)
            .bind(&event.user_agent)
            .bind(db_timestamp(event.downloaded_at)?)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn record_access(&self, event: &NewAccessEvent) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO access_logs (
                    user_id, ip, user_agent, action, status, details, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(event.user_id)
            .bind(&event.ip)
            .bind(&event.user_agent)
            .bind(&event.action)
            .bind(event.status)
            .bind(&event.details)
            .bind(db_timestamp(event.created_at)?)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn recent_downloads(&self, limit: u32) -> MetadataResult<Vec<DownloadEventRow>> {
            let rows = sqlx::query_as::<_, DownloadEventRow>(
                "SELECT * FROM download_stats ORDER BY downloaded_at DESC, id DESC LIMIT ?",
            )
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn recent_access(&self, limit: u32) -> MetadataResult<Vec<AccessEventRow>> {
            let rows = sqlx::query_as::<_, AccessEventRow>(
                "SELECT * FROM access_logs ORDER BY created_at DESC, id DESC LIMIT ?",
            )
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    // Timestamps are stored as RFC 3339 text in UTC, so the first ten
    // characters are the UTC calendar day.
    #[async_trait]
    impl StatsRepo for SqliteStore {
        async fn downloads_per_day(&self, days: u32) -> MetadataResult<Vec<DailyCount>> {
            let rows = sqlx::query_as::<_, DailyCount>(
                r#"
                SELECT substr(downloaded_at, 1, 10) AS day, COUNT(*) AS count
                FROM download_stats
                GROUP BY day
                ORDER BY day DESC
                LIMIT ?
                "#,
            )
            .bind(i64::from(days))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn registrations_per_day(&self, days: u32) -> MetadataResult<Vec<DailyCount>> {
            let rows = sqlx::query_as::<_, DailyCount>(
                r#"
                SELECT substr(created_at, 1, 10) AS day, COUNT(*) AS count
                FROM users
                GROUP BY day
                ORDER BY day DESC
                LIMIT ?
                "#,
            )
            .bind(i64::from(days))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn access_per_day(&self, days: u32) -> MetadataResult<Vec<DailyCount>> {
            let rows = sqlx::query_as::<_, DailyCount>(
                r#"
                SELECT substr(created_at, 1, 10) AS day, COUNT(*) AS count
                FROM access_logs
                GROUP BY day
                ORDER BY day DESC
                LIMIT ?
                "#,
            )
            .bind(i64::from(days))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn downloads_by_platform(&self) -> MetadataResult<Vec<PlatformCount>> {
            let rows = sqlx::query_as::<_, PlatformCount>(
                "SELECT platform, COUNT(*) AS count FROM download_stats GROUP BY platform",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn count_download_events(&self) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM download_stats")
                .fetch_one(&self.pool)
                .await?;
            Ok(count as u64)
        }

        async fn count_active_users(&self, since: OffsetDateTime) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(DISTINCT user_id)
                FROM access_logs
                WHERE user_id IS NOT NULL AND created_at >= ?
                "#,
            )
            .bind(db_timestamp(since)?)
            .fetch_one(&self.pool)
            .await?;
            Ok(count as u64)
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Accounts
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    is_admin INTEGER NOT NULL DEFAULT 0,
    last_login TEXT,
    login_count INTEGER NOT NULL DEFAULT 0 CHECK (login_count >= 0),
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f000000Z', 'now'))
);
CREATE INDEX IF NOT EXISTS idx_users_created ON users(created_at);

-- Login sessions (token_hash = SHA-256 of the cookie value)
CREATE TABLE IF NOT EXISTS sessions (
    session_id BLOB PRIMARY KEY,
    token_hash TEXT NOT NULL UNIQUE,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

-- Releases
CREATE TABLE IF NOT EXISTS versions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    version TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    windows_url TEXT,
    mac_url TEXT,
    linux_url TEXT,
    download_count INTEGER NOT NULL DEFAULT 0 CHECK (download_count >= 0),
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f000000Z', 'now'))
);
CREATE INDEX IF NOT EXISTS idx_versions_created ON versions(created_at);

-- Event logs
CREATE TABLE IF NOT EXISTS download_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    version_id INTEGER REFERENCES versions(id) ON DELETE SET NULL,
    platform TEXT NOT NULL,
    user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
    ip TEXT NOT NULL,
    user_agent TEXT NOT NULL,
    downloaded_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f000000Z', 'now'))
);
CREATE INDEX IF NOT EXISTS idx_download_stats_time ON download_stats(downloaded_at);
CREATE INDEX IF NOT EXISTS idx_download_stats_version ON download_stats(version_id);

CREATE TABLE IF NOT EXISTS access_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
    ip TEXT NOT NULL,
    user_agent TEXT NOT NULL,
    action TEXT NOT NULL,
    status INTEGER NOT NULL,
    details TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f000000Z', 'now'))
);
CREATE INDEX IF NOT EXISTS idx_access_logs_time ON access_logs(created_at);
CREATE INDEX IF NOT EXISTS idx_access_logs_user ON access_logs(user_id);
"#;
