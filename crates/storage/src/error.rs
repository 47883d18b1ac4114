//! Blob storage errors.

use thiserror::Error;

/// Failure of an artifact blob operation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No blob is stored under the key.
    #[error("no artifact stored at '{0}'")]
    NotFound(String),

    #[error("artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The remote object service rejected or failed the request.
    #[error("object service request failed: {0}")]
    Remote(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The key escapes the storage root or is otherwise unusable.
    #[error("artifact key '{0}' is not allowed")]
    InvalidKey(String),

    #[error("storage backend misconfigured: {0}")]
    Config(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_messages_name_the_key() {
        let err = StorageError::NotFound("artifacts/windows-1-ab-setup.exe".to_string());
        assert_eq!(
            err.to_string(),
            "no artifact stored at 'artifacts/windows-1-ab-setup.exe'"
        );
        assert_eq!(
            StorageError::InvalidKey("../portal.db".to_string()).to_string(),
            "artifact key '../portal.db' is not allowed"
        );
    }

    #[test]
    fn test_remote_error_keeps_source() {
        let err = StorageError::Remote(Box::new(std::io::Error::other("throttled")));
        assert!(err.source().is_some());
        assert!(err.to_string().ends_with("throttled"));
    }
}
