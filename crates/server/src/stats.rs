//! Statistics aggregator for the admin dashboard.

use crate::error::ApiResult;
use portal_core::{Platform, STATS_DAYS};
use portal_metadata::MetadataStore;
use portal_metadata::models::{DailyCount, PlatformCount};
use portal_metadata::repos::{StatsRepo, UserRepo, VersionRepo};
use serde::Serialize;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Window used for the active-user count.
const ACTIVE_WINDOW: Duration = Duration::days(30);

/// A per-day series, newest day first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DailySeries {
    pub labels: Vec<String>,
    pub values: Vec<i64>,
}

impl From<Vec<DailyCount>> for DailySeries {
    fn from(counts: Vec<DailyCount>) -> Self {
        let (labels, values) = counts.into_iter().map(|c| (c.day, c.count)).unzip();
        Self { labels, values }
    }
}

/// Download totals per platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlatformBreakdown {
    pub windows: i64,
    pub mac: i64,
    pub linux: i64,
}

impl PlatformBreakdown {
    /// Fold grouped counts; rows with an unrecognised platform are skipped.
    pub fn from_counts(counts: &[PlatformCount]) -> Self {
        let mut breakdown = Self::default();
        for row in counts {
            match Platform::parse(&row.platform) {
                Ok(Platform::Windows) => breakdown.windows += row.count,
                Ok(Platform::Mac) => breakdown.mac += row.count,
                Ok(Platform::Linux) => breakdown.linux += row.count,
                Err(_) => {
                    tracing::debug!(platform = %row.platform, "Skipping unknown platform in stats")
                }
            }
        }
        breakdown
    }
}

/// Headline numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_users: u64,
    pub total_downloads: u64,
    pub total_versions: u64,
    pub active_users: u64,
}

/// Read-only aggregation over the event logs.
pub struct StatsAggregator {
    metadata: Arc<dyn MetadataStore>,
}

impl StatsAggregator {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    pub async fn downloads_per_day(&self) -> ApiResult<DailySeries> {
        Ok(self.metadata.downloads_per_day(STATS_DAYS).await?.into())
    }

    pub async fn registrations_per_day(&self) -> ApiResult<DailySeries> {
        Ok(self.metadata.registrations_per_day(STATS_DAYS).await?.into())
    }

    pub async fn access_per_day(&self) -> ApiResult<DailySeries> {
        Ok(self.metadata.access_per_day(STATS_DAYS).await?.into())
    }

    pub async fn platform_breakdown(&self) -> ApiResult<PlatformBreakdown> {
        let counts = self.metadata.downloads_by_platform().await?;
        Ok(PlatformBreakdown::from_counts(&counts))
    }

    /// The four counters are read concurrently with no shared snapshot.
    pub async fn summary(&self) -> ApiResult<Summary> {
        self.summary_at(OffsetDateTime::now_utc()).await
    }

    pub async fn summary_at(&self, now: OffsetDateTime) -> ApiResult<Summary> {
        let (total_users, total_downloads, total_versions, active_users) = tokio::try_join!(
            self.metadata.count_users(),
            self.metadata.count_download_events(),
            self.metadata.count_versions(),
            self.metadata.count_active_users(now - ACTIVE_WINDOW),
        )?;

        Ok(Summary {
            total_users,
            total_downloads,
            total_versions,
            active_users,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_metadata::SqliteStore;
    use portal_metadata::models::{NewAccessEvent, NewDownloadEvent, NewUser, NewVersion};
    use portal_metadata::repos::EventRepo;

    async fn aggregator() -> (tempfile::TempDir, Arc<dyn MetadataStore>, StatsAggregator) {
        let temp = tempfile::tempdir().unwrap();
        let metadata: Arc<dyn MetadataStore> =
            Arc::new(SqliteStore::new(temp.path().join("portal.db"), 1).await.unwrap());
        let stats = StatsAggregator::new(metadata.clone());
        (temp, metadata, stats)
    }

    fn download(platform: &str, at: OffsetDateTime) -> NewDownloadEvent {
        NewDownloadEvent {
            version_id: None,
            platform: platform.to_string(),
            user_id: None,
            ip: "127.0.0.1".to_string(),
            user_agent: "test".to_string(),
            downloaded_at: at,
        }
    }

    #[test]
    fn test_breakdown_ignores_unknown_platforms() {
        let counts = vec![
            PlatformCount {
                platform: "windows".to_string(),
                count: 3,
            },
            PlatformCount {
                platform: "linux".to_string(),
                count: 1,
            },
            PlatformCount {
                platform: "beos".to_string(),
                count: 9,
            },
        ];
        let breakdown = PlatformBreakdown::from_counts(&counts);
        assert_eq!(
            breakdown,
            PlatformBreakdown {
                windows: 3,
                mac: 0,
                linux: 1
            }
        );
    }

    #[test]
    fn test_series_json_shape() {
        let series = DailySeries::from(vec![
            DailyCount {
                day: "2024-03-02".to_string(),
                count: 4,
            },
            DailyCount {
                day: "2024-03-01".to_string(),
                count: 1,
            },
        ]);
        let json = serde_json::to_value(&series).unwrap();
        assert_eq!(json["labels"], serde_json::json!(["2024-03-02", "2024-03-01"]));
        assert_eq!(json["values"], serde_json::json!([4, 1]));
    }

    #[tokio::test]
    async fn test_empty_store_yields_zeroes() {
        let (_temp, _metadata, stats) = aggregator().await;
        assert_eq!(stats.downloads_per_day().await.unwrap(), DailySeries::default());
        assert_eq!(
            stats.platform_breakdown().await.unwrap(),
            PlatformBreakdown::default()
        );
        let summary = stats.summary().await.unwrap();
        assert_eq!(summary.total_users, 0);
        assert_eq!(summary.active_users, 0);
    }

    #[tokio::test]
    async fn test_downloads_bucket_by_utc_day() {
        let (_temp, metadata, stats) = aggregator().await;
        let day_one = time::macros::datetime!(2024-03-01 23:30 UTC);
        let day_two = time::macros::datetime!(2024-03-02 00:30 UTC);
        metadata.record_download(&download("windows", day_one)).await.unwrap();
        metadata.record_download(&download("mac", day_two)).await.unwrap();
        metadata.record_download(&download("mac", day_two)).await.unwrap();

        let series = stats.downloads_per_day().await.unwrap();
        assert_eq!(series.labels, vec!["2024-03-02", "2024-03-01"]);
        assert_eq!(series.values, vec![2, 1]);

        let breakdown = stats.platform_breakdown().await.unwrap();
        assert_eq!(breakdown.mac, 2);
        assert_eq!(breakdown.windows, 1);
    }

    #[tokio::test]
    async fn test_summary_counts_active_users_in_window() {
        let (_temp, metadata, stats) = aggregator().await;
        let now = OffsetDateTime::now_utc();

        let mut ids = Vec::new();
        for name in ["alice", "bob"] {
            ids.push(
                metadata
                    .create_user(&NewUser {
                        username: name.to_string(),
                        email: format!("{name}@example.com"),
                        password_hash: "hash".to_string(),
                        is_admin: false,
                        created_at: now,
                    })
                    .await
                    .unwrap(),
            );
        }
        metadata
            .create_version(&NewVersion {
                version: "1.0".to_string(),
                description: String::new(),
                windows_url: None,
                mac_url: None,
                linux_url: None,
                created_at: now,
            })
            .await
            .unwrap();
        metadata.record_download(&download("linux", now)).await.unwrap();

        let access = |user_id: Option<i64>, at: OffsetDateTime| NewAccessEvent {
            user_id,
            ip: "127.0.0.1".to_string(),
            user_agent: "test".to_string(),
            action: "login".to_string(),
            status: 200,
            details: None,
            created_at: at,
        };
        // Alice twice in window, bob only long ago, one anonymous event.
        metadata.record_access(&access(Some(ids[0]), now)).await.unwrap();
        metadata
            .record_access(&access(Some(ids[0]), now - Duration::days(1)))
            .await
            .unwrap();
        metadata
            .record_access(&access(Some(ids[1]), now - Duration::days(45)))
            .await
            .unwrap();
        metadata.record_access(&access(None, now)).await.unwrap();

        let summary = stats.summary_at(now).await.unwrap();
        assert_eq!(
            summary,
            Summary {
                total_users: 2,
                total_downloads: 1,
                total_versions: 1,
                active_users: 1,
            }
        );

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["totalUsers"], 2);
        assert_eq!(json["activeUsers"], 1);
    }
}
