//! Bootstrap administrator initialization.

use anyhow::{Context, Result};
use portal_core::config::AdminConfig;
use portal_core::{normalize_email, validate_username};
use portal_metadata::MetadataStore;
use portal_metadata::models::NewUser;
use time::OffsetDateTime;

/// Ensure the configured administrator exists.
///
/// An existing account with the same username is promoted to admin and its
/// password hash replaced if the configured hash changed between restarts.
pub async fn ensure_admin_user(metadata: &dyn MetadataStore, config: &AdminConfig) -> Result<()> {
    let username = validate_username(&config.username).context("invalid admin.username")?;

    if let Some(existing) = metadata.get_user_by_username(&username).await? {
        if !existing.is_admin {
            metadata.set_admin(existing.id, true).await?;
            tracing::info!(user_id = existing.id, "Bootstrap user promoted to admin");
        }
        if existing.password_hash != config.password_hash {
            metadata
                .update_password_hash(existing.id, &config.password_hash)
                .await?;
            tracing::info!(user_id = existing.id, "Bootstrap admin password rotated");
        }
        tracing::debug!("Bootstrap admin already exists");
        return Ok(());
    }

    let email = normalize_email(&config.email).context("invalid admin.email")?;
    let id = metadata
        .create_user(&NewUser {
            username: username.clone(),
            email,
            password_hash: config.password_hash.clone(),
            is_admin: true,
            created_at: OffsetDateTime::now_utc(),
        })
        .await
        .context("failed to create bootstrap admin")?;
    tracing::info!(user_id = id, username = %username, "Bootstrap admin created");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_metadata::SqliteStore;
    use portal_metadata::repos::UserRepo;

    const HASH_A: &str = "$2b$04$abcdefghijklmnopqrstuu5nCmhd0Xmc7G6WbNtMOo.9OqIvhqkYm";
    const HASH_B: &str = "$2b$04$zyxwvutsrqponmlkjihgfeTnJ1Cd3pl4m4Cb3s2kYuYbWwbOGPg4K";

    fn admin(hash: &str) -> AdminConfig {
        AdminConfig {
            username: "root".to_string(),
            email: "Root@Example.com".to_string(),
            password_hash: hash.to_string(),
        }
    }

    async fn store() -> (tempfile::TempDir, SqliteStore) {
        let temp = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(temp.path().join("portal.db"), 1).await.unwrap();
        (temp, store)
    }

    #[tokio::test]
    async fn test_creates_admin_once() {
        let (_temp, store) = store().await;
        ensure_admin_user(&store, &admin(HASH_A)).await.unwrap();
        ensure_admin_user(&store, &admin(HASH_A)).await.unwrap();

        assert_eq!(store.count_users().await.unwrap(), 1);
        let row = store.get_user_by_username("root").await.unwrap().unwrap();
        assert!(row.is_admin);
        assert_eq!(row.email, "root@example.com");
        assert_eq!(row.password_hash, HASH_A);
    }

    #[tokio::test]
    async fn test_rotates_hash_and_restores_admin_flag() {
        let (_temp, store) = store().await;
        ensure_admin_user(&store, &admin(HASH_A)).await.unwrap();
        let row = store.get_user_by_username("root").await.unwrap().unwrap();
        store.set_admin(row.id, false).await.unwrap();

        ensure_admin_user(&store, &admin(HASH_B)).await.unwrap();
        let row = store.get_user_by_username("root").await.unwrap().unwrap();
        assert!(row.is_admin);
        assert_eq!(row.password_hash, HASH_B);
    }
}
