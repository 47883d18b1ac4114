//! Core domain types and shared logic for the distribution portal.
//!
//! This crate defines the vocabulary used across all other crates:
//! - Release platforms and their artifact extension rules
//! - Artifact blob key generation
//! - Account input normalization and validation
//! - Identifier newtypes
//! - Configuration

pub mod account;
pub mod artifact;
pub mod config;
pub mod error;
pub mod ids;
pub mod platform;

pub use account::{normalize_email, validate_password, validate_username};
pub use artifact::{ARTIFACT_PREFIX, ArtifactKey, artifact_file_name, sanitize_file_name};
pub use error::{Error, Result};
pub use ids::{UserId, VersionId};
pub use platform::Platform;

/// Maximum combined size of one version upload: 500 MiB
pub const MAX_UPLOAD_SIZE: u64 = 500 * 1024 * 1024;

/// Default number of versions returned by a listing.
pub const DEFAULT_VERSION_LIST_LIMIT: u32 = 10;

/// Upper bound on a caller-supplied listing limit.
pub const MAX_VERSION_LIST_LIMIT: u32 = 100;

/// Number of day buckets returned by time-series statistics.
pub const STATS_DAYS: u32 = 30;
