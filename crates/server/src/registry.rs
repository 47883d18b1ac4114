//! Version registry: release records and download resolution.

use crate::artifacts::PlatformUrls;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use portal_core::{
    DEFAULT_VERSION_LIST_LIMIT, MAX_VERSION_LIST_LIMIT, Platform, UserId, VersionId,
};
use portal_metadata::MetadataStore;
use portal_metadata::models::{NewDownloadEvent, NewVersion, VersionRow};
use portal_metadata::repos::{EventRepo, VersionRepo};
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;

/// Longest accepted version label.
pub const MAX_VERSION_LABEL_LEN: usize = 128;

/// A release as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: VersionId,
    pub version: String,
    pub description: String,
    pub windows_url: Option<String>,
    pub mac_url: Option<String>,
    pub linux_url: Option<String>,
    pub download_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Version {
    /// The recorded URL for `platform`, if any.
    pub fn url_for(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Windows => self.windows_url.as_deref(),
            Platform::Mac => self.mac_url.as_deref(),
            Platform::Linux => self.linux_url.as_deref(),
        }
    }
}

impl From<VersionRow> for Version {
    fn from(row: VersionRow) -> Self {
        Self {
            id: VersionId::new(row.id),
            version: row.version,
            description: row.description,
            windows_url: row.windows_url,
            mac_url: row.mac_url,
            linux_url: row.linux_url,
            download_count: row.download_count,
            created_at: row.created_at,
        }
    }
}

/// Who asked for a download.
#[derive(Debug, Clone)]
pub struct Downloader {
    pub user_id: Option<UserId>,
    pub ip: String,
    pub user_agent: String,
}

/// Trim and check a version label.
///
/// Labels are opaque; no semver parsing happens and duplicates are allowed.
pub fn validate_label(raw: &str) -> ApiResult<String> {
    let label = raw.trim();
    if label.is_empty() {
        return Err(ApiError::BadRequest("version is required".to_string()));
    }
    if label.chars().count() > MAX_VERSION_LABEL_LEN {
        return Err(ApiError::BadRequest(format!(
            "version must be at most {MAX_VERSION_LABEL_LEN} characters"
        )));
    }
    Ok(label.to_string())
}

/// Clamp a caller-supplied listing limit.
pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit
        .unwrap_or(DEFAULT_VERSION_LIST_LIMIT)
        .clamp(1, MAX_VERSION_LIST_LIMIT)
}

/// Stores releases and resolves download requests.
pub struct VersionRegistry {
    metadata: Arc<dyn MetadataStore>,
}

impl VersionRegistry {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    /// Record a new release. Partial releases with no URLs are allowed.
    pub async fn create(
        &self,
        label: &str,
        description: &str,
        urls: &PlatformUrls,
    ) -> ApiResult<Version> {
        let label = validate_label(label)?;
        let row = self
            .metadata
            .create_version(&NewVersion {
                version: label,
                description: description.trim().to_string(),
                windows_url: urls.get(&Platform::Windows).cloned(),
                mac_url: urls.get(&Platform::Mac).cloned(),
                linux_url: urls.get(&Platform::Linux).cloned(),
                created_at: OffsetDateTime::now_utc(),
            })
            .await?;

        tracing::info!(version_id = row.id, version = %row.version, "Version created");
        Ok(row.into())
    }

    /// Newest releases first.
    pub async fn list(&self, limit: Option<u32>) -> ApiResult<Vec<Version>> {
        let rows = self.metadata.list_versions(clamp_limit(limit)).await?;
        Ok(rows.into_iter().map(Version::from).collect())
    }

    /// Resolve the URL of one platform artifact and record the download.
    ///
    /// Malformed ids and unknown platforms are `NotFound`, like missing rows.
    /// The event write and counter increment run concurrently and are
    /// best-effort.
    pub async fn resolve_download(
        &self,
        version_id: &str,
        platform: &str,
        downloader: Downloader,
    ) -> ApiResult<String> {
        let id = VersionId::parse(version_id)
            .map_err(|_| ApiError::NotFound(format!("version {version_id}")))?;
        let platform = Platform::parse(platform)
            .map_err(|_| ApiError::NotFound(format!("platform {platform}")))?;

        let version: Version = self
            .metadata
            .get_version(id.as_i64())
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("version {id}")))?
            .into();

        let url = version
            .url_for(platform)
            .ok_or_else(|| ApiError::NotFound(format!("{platform} download for version {id}")))?
            .to_string();

        let event = NewDownloadEvent {
            version_id: Some(id.as_i64()),
            platform: platform.as_str().to_string(),
            user_id: downloader.user_id.map(|u| u.as_i64()),
            ip: downloader.ip,
            user_agent: downloader.user_agent,
            downloaded_at: OffsetDateTime::now_utc(),
        };
        let (recorded, counted) = tokio::join!(
            self.metadata.record_download(&event),
            self.metadata.increment_download_count(id.as_i64()),
        );
        if let Err(e) = recorded {
            tracing::warn!(version_id = %id, error = %e, "Failed to record download event");
        }
        if let Err(e) = counted {
            tracing::warn!(version_id = %id, error = %e, "Failed to increment download count");
        }

        metrics::DOWNLOADS
            .with_label_values(&[platform.as_str()])
            .inc();
        Ok(url)
    }
}
