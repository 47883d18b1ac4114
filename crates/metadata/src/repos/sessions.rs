//! Login session repository.

use crate::error::MetadataResult;
use crate::models::SessionRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for server-side sessions.
#[async_trait]
pub trait SessionRepo: Send + Sync {
    /// Create a session.
    async fn create_session(&self, session: &SessionRow) -> MetadataResult<()>;

    /// Get a session by token hash. Expired rows are returned as-is; callers check expiry.
    async fn get_session_by_hash(&self, token_hash: &str) -> MetadataResult<Option<SessionRow>>;

    /// Delete a session by token hash. Returns whether a row was removed.
    async fn delete_session_by_hash(&self, token_hash: &str) -> MetadataResult<bool>;

    /// Delete sessions that expired at or before `now`. Returns the number removed.
    async fn delete_expired_sessions(&self, now: OffsetDateTime) -> MetadataResult<u64>;
}
