//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("file {file_name:?} is not allowed for {platform} (allowed: {allowed})")]
    DisallowedExtension {
        platform: String,
        file_name: String,
        allowed: String,
    },

    #[error("invalid username: {0}")]
    InvalidUsername(String),

    #[error("invalid email: {0}")]
    InvalidEmail(String),

    #[error("invalid password: {0}")]
    InvalidPassword(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
