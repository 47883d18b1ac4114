//! Append-only event log repository.

use crate::error::MetadataResult;
use crate::models::{AccessEventRow, DownloadEventRow, NewAccessEvent, NewDownloadEvent};
use async_trait::async_trait;

/// Repository for download and access events.
#[async_trait]
pub trait EventRepo: Send + Sync {
    /// Append a download event.
    async fn record_download(&self, event: &NewDownloadEvent) -> MetadataResult<()>;

    /// Append an access event.
    async fn record_access(&self, event: &NewAccessEvent) -> MetadataResult<()>;

    /// Most recent download events, newest first.
    async fn recent_downloads(&self, limit: u32) -> MetadataResult<Vec<DownloadEventRow>>;

    /// Most recent access events, newest first.
    async fn recent_access(&self, limit: u32) -> MetadataResult<Vec<AccessEventRow>>;
}
