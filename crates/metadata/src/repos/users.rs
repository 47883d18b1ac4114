//! User repository.

use crate::error::MetadataResult;
use crate::models::{NewUser, UserRow};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for user accounts.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Insert a user and return the assigned id.
    ///
    /// Fails with `AlreadyExists` when the username or email is taken; the
    /// UNIQUE constraints decide, so concurrent registrations cannot both win.
    async fn create_user(&self, user: &NewUser) -> MetadataResult<i64>;

    /// Get a user by id.
    async fn get_user(&self, id: i64) -> MetadataResult<Option<UserRow>>;

    /// Get a user by exact (case-sensitive) username.
    async fn get_user_by_username(&self, username: &str) -> MetadataResult<Option<UserRow>>;

    /// Set `last_login` and increment `login_count` in one statement.
    async fn record_login(&self, id: i64, at: OffsetDateTime) -> MetadataResult<()>;

    /// Grant or revoke the admin flag.
    async fn set_admin(&self, id: i64, is_admin: bool) -> MetadataResult<()>;

    /// Replace the stored password hash.
    async fn update_password_hash(&self, id: i64, password_hash: &str) -> MetadataResult<()>;

    /// Count all users.
    async fn count_users(&self) -> MetadataResult<u64>;
}
