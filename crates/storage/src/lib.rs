//! Object storage abstraction and backends for release artifacts.
//!
//! This crate provides:
//! - The `ObjectStore` trait with atomic writes and streaming reads
//! - Backends: local filesystem and S3-compatible

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectMeta, ObjectStore};

use portal_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
            public_url,
        } => {
            let backend = S3Backend::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
                public_url.clone(),
            )
            .await?;
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().join("artifacts"),
        };

        let store = from_config(&config).await.unwrap();
        store
            .put("hello.txt", Bytes::from_static(b"hi"))
            .await
            .unwrap();
        assert!(store.exists("hello.txt").await.unwrap());
        assert_eq!(store.backend_name(), "filesystem");
        assert!(store.public_url("hello.txt").is_none());
    }

    #[tokio::test]
    async fn from_config_s3_ok() {
        let config = StorageConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: Some("minio:9000".to_string()),
            region: Some("us-east-1".to_string()),
            prefix: Some("portal".to_string()),
            access_key_id: Some("access".to_string()),
            secret_access_key: Some("secret".to_string()),
            force_path_style: true,
            public_url: None,
        };

        let store = from_config(&config).await.unwrap();
        assert_eq!(store.backend_name(), "s3");
    }

    #[tokio::test]
    async fn from_config_rejects_partial_credentials() {
        let config = StorageConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("access".to_string()),
            secret_access_key: None,
            force_path_style: false,
            public_url: None,
        };

        match from_config(&config).await {
            Ok(_) => panic!("expected error"),
            Err(StorageError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
