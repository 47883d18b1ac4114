//! Version repository.

use crate::error::MetadataResult;
use crate::models::{NewVersion, VersionRow};
use async_trait::async_trait;

/// Repository for released versions.
#[async_trait]
pub trait VersionRepo: Send + Sync {
    /// Insert a version with a zero download counter and return the stored row.
    /// Version labels are not unique.
    async fn create_version(&self, version: &NewVersion) -> MetadataResult<VersionRow>;

    /// Get a version by id.
    async fn get_version(&self, id: i64) -> MetadataResult<Option<VersionRow>>;

    /// List the most recently created versions, newest first.
    async fn list_versions(&self, limit: u32) -> MetadataResult<Vec<VersionRow>>;

    /// Atomically add one to the download counter.
    /// Fails with `NotFound` if the version does not exist.
    async fn increment_download_count(&self, id: i64) -> MetadataResult<()>;

    /// Count all versions.
    async fn count_versions(&self) -> MetadataResult<u64>;
}
