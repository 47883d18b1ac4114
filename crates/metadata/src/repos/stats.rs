//! Aggregation queries over the event logs.

use crate::error::MetadataResult;
use crate::models::{DailyCount, PlatformCount};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Read-only statistics.
///
/// Daily series bucket by UTC calendar day and return the most recent
/// `days` buckets that have at least one event, newest first.
#[async_trait]
pub trait StatsRepo: Send + Sync {
    /// Downloads per day.
    async fn downloads_per_day(&self, days: u32) -> MetadataResult<Vec<DailyCount>>;

    /// Registrations per day.
    async fn registrations_per_day(&self, days: u32) -> MetadataResult<Vec<DailyCount>>;

    /// Access events per day.
    async fn access_per_day(&self, days: u32) -> MetadataResult<Vec<DailyCount>>;

    /// Downloads grouped by stored platform value.
    async fn downloads_by_platform(&self) -> MetadataResult<Vec<PlatformCount>>;

    /// Total number of download events.
    async fn count_download_events(&self) -> MetadataResult<u64>;

    /// Distinct users with an access event at or after `since`.
    async fn count_active_users(&self, since: OffsetDateTime) -> MetadataResult<u64>;
}
