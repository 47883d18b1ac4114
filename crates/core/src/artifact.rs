//! Artifact blob key generation.

use crate::Platform;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Key prefix under which all release artifacts are stored.
pub const ARTIFACT_PREFIX: &str = "artifacts/";

/// Longest sanitized file name kept in a key.
const MAX_NAME_LEN: usize = 100;

/// A collision-resistant blob key for one uploaded artifact.
///
/// Format: `artifacts/{platform}-{unix_millis}-{16 hex random}-{sanitized name}`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    /// Generate a fresh key for a file uploaded now.
    pub fn generate(platform: Platform, file_name: &str) -> Self {
        Self::generate_at(platform, file_name, OffsetDateTime::now_utc())
    }

    /// Generate a key with an explicit timestamp.
    pub fn generate_at(platform: Platform, file_name: &str, at: OffsetDateTime) -> Self {
        let millis = at.unix_timestamp_nanos() / 1_000_000;
        let random = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{ARTIFACT_PREFIX}{}-{millis}-{}-{}",
            platform.as_str(),
            &random[..16],
            sanitize_file_name(file_name)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArtifactKey({})", self.0)
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The sanitized file name embedded in an artifact key, if `key` is one.
pub fn artifact_file_name(key: &str) -> Option<&str> {
    key.strip_prefix(ARTIFACT_PREFIX)?
        .splitn(4, '-')
        .nth(3)
        .filter(|name| !name.is_empty())
}

/// Reduce a client-supplied file name to a safe key component.
///
/// Directory parts are dropped, every character outside `[A-Za-z0-9._-]`
/// becomes `_` and runs of dots collapse to one, so the result never contains
/// `..`. The result is never empty.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);

    let mut out = String::with_capacity(base.len());
    for c in base.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
            c
        } else {
            '_'
        };
        if c == '.' && out.ends_with('.') {
            continue;
        }
        out.push(c);
    }

    if out.len() > MAX_NAME_LEN {
        // Keep the tail so the extension survives.
        out = out[out.len() - MAX_NAME_LEN..].to_string();
    }

    if out.is_empty() || out.chars().all(|c| c == '.') {
        return "artifact".to_string();
    }
    out
}
