//! Artifact upload pipeline.
//!
//! A version upload carries up to three platform files. The whole multipart
//! body is buffered and validated before anything is written, then the files
//! are stored one by one. If any write fails, the blobs already written are
//! deleted again so a rejected upload leaves no artifacts behind.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use axum::extract::Multipart;
use axum::extract::multipart::Field;
use bytes::{Bytes, BytesMut};
use portal_core::{ArtifactKey, Platform};
use portal_storage::{ObjectStore, StorageError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// One validated file waiting to be stored.
#[derive(Debug, Clone)]
pub struct PendingArtifact {
    pub platform: Platform,
    pub file_name: String,
    pub data: Bytes,
}

/// A parsed and validated version upload form.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub version: String,
    pub description: String,
    pub files: Vec<PendingArtifact>,
}

impl UploadForm {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.data.len() as u64).sum()
    }
}

/// A stored artifact and its public URL.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub platform: Platform,
    pub key: String,
    pub url: String,
    pub size: u64,
}

/// Per-platform URLs of one upload.
pub type PlatformUrls = BTreeMap<Platform, String>;

/// Collect the URLs of stored artifacts by platform.
pub fn platform_urls(stored: &[StoredArtifact]) -> PlatformUrls {
    stored
        .iter()
        .map(|artifact| (artifact.platform, artifact.url.clone()))
        .collect()
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::InvalidUpload(err.body_text())
}

/// Read and validate a version upload.
///
/// Per file part, in order: the field must name a platform, its file name must
/// carry an allowed extension, and the running total must stay within
/// `max_bytes`. Text fields `version` and `description` are taken verbatim;
/// other text fields are ignored.
pub async fn read_upload_form(mut multipart: Multipart, max_bytes: u64) -> ApiResult<UploadForm> {
    let mut form = UploadForm::default();
    let mut total: u64 = 0;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);

        match (name.as_str(), file_name) {
            ("version", None) => form.version = field.text().await.map_err(multipart_error)?,
            ("description", None) => {
                form.description = field.text().await.map_err(multipart_error)?
            }
            (_, None) if Platform::parse(&name).is_err() => {
                tracing::debug!(field = %name, "Ignoring unknown form field");
            }
            (_, None) => {
                return Err(ApiError::InvalidUpload(format!(
                    "field '{name}' must be a file"
                )));
            }
            (_, Some(file_name)) => {
                let platform = Platform::parse(&name).map_err(|_| {
                    ApiError::InvalidUpload(format!("unexpected file field '{name}'"))
                })?;

                // Browsers send an empty part for a file input left blank.
                if file_name.is_empty() {
                    let data = read_limited(field, &mut total, max_bytes).await?;
                    if data.is_empty() {
                        continue;
                    }
                    return Err(ApiError::InvalidUpload(format!(
                        "file for {platform} has no name"
                    )));
                }

                if form.files.iter().any(|f| f.platform == platform) {
                    return Err(ApiError::InvalidUpload(format!(
                        "more than one file for {platform}"
                    )));
                }

                platform
                    .validate_file_name(&file_name)
                    .map_err(|e| ApiError::InvalidUpload(e.to_string()))?;

                let data = read_limited(field, &mut total, max_bytes).await?;
                form.files.push(PendingArtifact {
                    platform,
                    file_name,
                    data,
                });
            }
        }
    }

    Ok(form)
}

/// Buffer one field while enforcing the cumulative size limit.
async fn read_limited(mut field: Field<'_>, total: &mut u64, max_bytes: u64) -> ApiResult<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        *total += chunk.len() as u64;
        if *total > max_bytes {
            return Err(ApiError::InvalidUpload(format!(
                "upload exceeds the maximum size of {max_bytes} bytes"
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// Writes validated artifacts to blob storage.
pub struct ArtifactUploader {
    storage: Arc<dyn ObjectStore>,
    public_base_url: Option<String>,
}

impl ArtifactUploader {
    pub fn new(storage: Arc<dyn ObjectStore>, public_base_url: Option<String>) -> Self {
        Self {
            storage,
            public_base_url,
        }
    }

    /// Publicly fetchable URL for a stored key.
    pub fn url_for(&self, key: &str) -> String {
        if let Some(url) = self.storage.public_url(key) {
            return url;
        }
        match &self.public_base_url {
            Some(base) => format!("{base}/files/{key}"),
            None => format!("/files/{key}"),
        }
    }

    /// Store every file or none of them.
    pub async fn store_all(&self, files: Vec<PendingArtifact>) -> ApiResult<Vec<StoredArtifact>> {
        let started = Instant::now();
        let mut stored: Vec<StoredArtifact> = Vec::with_capacity(files.len());

        for file in files {
            let key = ArtifactKey::generate(file.platform, &file.file_name).into_string();
            let size = file.data.len() as u64;

            if let Err(e) = self.storage.put(&key, file.data).await {
                tracing::error!(
                    platform = %file.platform,
                    key = %key,
                    error = %e,
                    "Artifact write failed, rolling back upload"
                );
                self.discard(&stored).await;
                return Err(ApiError::UploadFailed(e.to_string()));
            }

            tracing::info!(platform = %file.platform, key = %key, size, "Artifact stored");
            stored.push(StoredArtifact {
                platform: file.platform,
                url: self.url_for(&key),
                key,
                size,
            });
        }

        metrics::BYTES_UPLOADED.inc_by(stored.iter().map(|a| a.size).sum());
        metrics::UPLOAD_DURATION.observe(started.elapsed().as_secs_f64());
        Ok(stored)
    }

    /// Best-effort deletion of artifacts written by a failed upload.
    pub async fn discard(&self, stored: &[StoredArtifact]) {
        for artifact in stored {
            match self.storage.delete(&artifact.key).await {
                Ok(()) | Err(StorageError::NotFound(_)) => {}
                Err(e) => tracing::warn!(
                    key = %artifact.key,
                    error = %e,
                    "Failed to delete artifact of a failed upload"
                ),
            }
        }
    }
}
