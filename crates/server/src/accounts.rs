//! Credential store: registration and password verification.

use crate::error::{ApiError, ApiResult};
use portal_core::{UserId, normalize_email, validate_password, validate_username};
use portal_metadata::MetadataStore;
use portal_metadata::models::{NewUser, UserRow};
use portal_metadata::repos::UserRepo;
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;

/// Error text shared by every authentication failure so callers cannot tell
/// an unknown username from a wrong password.
pub const INVALID_CREDENTIALS: &str = "invalid username or password";

/// Plaintext hashed once to equalize timing for unknown usernames.
const DUMMY_PASSWORD: &str = "portal-timing-equalizer";

/// A user as exposed to clients. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    pub login_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::new(row.id),
            username: row.username,
            email: row.email,
            is_admin: row.is_admin,
            last_login: row.last_login,
            login_count: row.login_count,
            created_at: row.created_at,
        }
    }
}

/// Persists users and verifies their passwords with bcrypt.
pub struct CredentialStore {
    metadata: Arc<dyn MetadataStore>,
    bcrypt_cost: u32,
    dummy_hash: Arc<str>,
}

impl CredentialStore {
    pub fn new(metadata: Arc<dyn MetadataStore>, bcrypt_cost: u32) -> Self {
        let dummy_hash = bcrypt::hash(DUMMY_PASSWORD, bcrypt_cost).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to precompute dummy password hash");
            String::new()
        });
        Self {
            metadata,
            bcrypt_cost,
            dummy_hash: dummy_hash.into(),
        }
    }

    /// Create a non-admin account.
    ///
    /// Duplicate usernames or emails fail with `Conflict`; the UNIQUE
    /// constraints decide races between concurrent registrations.
    pub async fn register(&self, username: &str, password: &str, email: &str) -> ApiResult<UserId> {
        let username = validate_username(username)?;
        let email = normalize_email(email)?;
        validate_password(password)?;

        let password_hash = hash_password(password, self.bcrypt_cost).await?;
        let id = self
            .metadata
            .create_user(&NewUser {
                username: username.clone(),
                email,
                password_hash,
                is_admin: false,
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .map_err(ApiError::from)
            .map_err(|e| match e {
                ApiError::Conflict(_) => {
                    ApiError::Conflict("username or email already registered".to_string())
                }
                other => other,
            })?;

        tracing::info!(user_id = id, username = %username, "Account registered");
        Ok(UserId::new(id))
    }

    /// Verify credentials and record the login.
    ///
    /// Unknown usernames and wrong passwords fail identically. The login
    /// bookkeeping write is best-effort.
    pub async fn authenticate(&self, username: &str, password: &str) -> ApiResult<User> {
        let row = self.metadata.get_user_by_username(username.trim()).await?;

        let hash = match &row {
            Some(row) => row.password_hash.clone(),
            None => self.dummy_hash.to_string(),
        };
        let valid = verify_password(password, hash).await?;

        let row = match row {
            Some(row) if valid => row,
            _ => return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string())),
        };

        let now = OffsetDateTime::now_utc();
        let mut user = User::from(row);
        match self.metadata.record_login(user.id.as_i64(), now).await {
            Ok(()) => {
                user.last_login = Some(now);
                user.login_count += 1;
            }
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Failed to record login");
            }
        }
        Ok(user)
    }

    pub async fn find_by_id(&self, id: UserId) -> ApiResult<User> {
        self.metadata
            .get_user(id.as_i64())
            .await?
            .map(User::from)
            .ok_or_else(|| ApiError::NotFound(format!("user {id}")))
    }

    /// Whether `id` names an existing administrator.
    pub async fn is_admin(&self, id: UserId) -> ApiResult<bool> {
        Ok(self
            .metadata
            .get_user(id.as_i64())
            .await?
            .is_some_and(|row| row.is_admin))
    }
}

/// Hash a password on the blocking pool.
pub async fn hash_password(password: &str, cost: u32) -> ApiResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| ApiError::Internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

/// Verify a password on the blocking pool. A malformed stored hash counts as a mismatch.
async fn verify_password(password: &str, hash: String) -> ApiResult<bool> {
    let password = password.to_string();
    let result = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| ApiError::Internal(format!("password verification task failed: {e}")))?;

    match result {
        Ok(valid) => Ok(valid),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash could not be verified");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_metadata::SqliteStore;
    use tempfile::TempDir;

    async fn store() -> (TempDir, Arc<dyn MetadataStore>, CredentialStore) {
        let temp = tempfile::tempdir().unwrap();
        let metadata: Arc<dyn MetadataStore> =
            Arc::new(SqliteStore::new(temp.path().join("portal.db"), 1).await.unwrap());
        let credentials = CredentialStore::new(metadata.clone(), 4);
        (temp, metadata, credentials)
    }

    #[tokio::test]
    async fn test_register_stores_hash_not_password() {
        let (_temp, metadata, credentials) = store().await;
        let id = credentials
            .register("alice", "s3cret", "Alice@Example.com")
            .await
            .unwrap();

        let row = metadata.get_user(id.as_i64()).await.unwrap().unwrap();
        assert_eq!(row.email, "alice@example.com");
        assert_ne!(row.password_hash, "s3cret");
        assert!(row.password_hash.starts_with("$2"));
        assert!(!row.is_admin);
        assert_eq!(row.login_count, 0);
        assert!(row.last_login.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts_regardless_of_email() {
        let (_temp, _metadata, credentials) = store().await;
        credentials
            .register("alice", "pw", "a@example.com")
            .await
            .unwrap();
        let err = credentials
            .register("alice", "pw", "other@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts_case_insensitively() {
        let (_temp, _metadata, credentials) = store().await;
        credentials
            .register("alice", "pw", "a@example.com")
            .await
            .unwrap();
        let err = credentials
            .register("bob", "pw", "A@EXAMPLE.COM")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_hashing() {
        let (_temp, _metadata, credentials) = store().await;
        let err = credentials
            .register("has space", "pw", "a@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Core(_)));

        let long = "x".repeat(73);
        let err = credentials
            .register("bob", &long, "b@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Core(_)));
    }

    #[tokio::test]
    async fn test_authenticate_failures_are_indistinguishable() {
        let (_temp, _metadata, credentials) = store().await;
        credentials
            .register("alice", "right", "a@example.com")
            .await
            .unwrap();

        let wrong_password = credentials.authenticate("alice", "wrong").await.unwrap_err();
        let unknown_user = credentials.authenticate("mallory", "right").await.unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
        assert_eq!(wrong_password.code(), unknown_user.code());
        assert_eq!(wrong_password.status_code(), unknown_user.status_code());
    }

    #[tokio::test]
    async fn test_login_increments_count_and_sets_last_login() {
        let (_temp, metadata, credentials) = store().await;
        let id = credentials
            .register("alice", "right", "a@example.com")
            .await
            .unwrap();

        let first = credentials.authenticate("alice", "right").await.unwrap();
        assert_eq!(first.login_count, 1);
        let first_login = first.last_login.unwrap();

        let second = credentials.authenticate("alice", "right").await.unwrap();
        assert_eq!(second.login_count, 2);
        assert!(second.last_login.unwrap() >= first_login);

        let row = metadata.get_user(id.as_i64()).await.unwrap().unwrap();
        assert_eq!(row.login_count, 2);
    }

    #[tokio::test]
    async fn test_is_admin_and_find_by_id() {
        let (_temp, metadata, credentials) = store().await;
        let id = credentials
            .register("alice", "pw", "a@example.com")
            .await
            .unwrap();
        assert!(!credentials.is_admin(id).await.unwrap());

        metadata.set_admin(id.as_i64(), true).await.unwrap();
        assert!(credentials.is_admin(id).await.unwrap());
        assert!(credentials.find_by_id(id).await.unwrap().is_admin);

        let missing = UserId::new(9999);
        assert!(!credentials.is_admin(missing).await.unwrap());
        assert!(matches!(
            credentials.find_by_id(missing).await.unwrap_err(),
            ApiError::NotFound(_)
        ));
    }

    #[test]
    fn test_user_json_has_no_hash() {
        let user = User {
            id: UserId::new(1),
            username: "alice".to_string(),
            email: "a@example.com".to_string(),
            is_admin: true,
            last_login: None,
            login_count: 0,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["isAdmin"], true);
        assert_eq!(json["lastLogin"], serde_json::Value::Null);
        assert_eq!(json["createdAt"], "1970-01-01T00:00:00Z");
        assert!(json.get("passwordHash").is_none());
    }
}
