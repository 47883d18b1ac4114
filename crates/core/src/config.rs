//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Absolute origin prefixed to artifact URLs served by this process
    /// (e.g., "https://downloads.example.com"). Relative URLs when unset.
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Maximum combined size of the files in one version upload.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: When enabled, ensure this endpoint is network-restricted
    /// to authorized Prometheus scraper IPs only at the infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Origins allowed to make cross-origin requests.
    /// Empty means same-origin only; `["*"]` allows any origin without credentials.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_upload_bytes() -> u64 {
    crate::MAX_UPLOAD_SIZE
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_base_url: None,
            max_upload_bytes: default_max_upload_bytes(),
            metrics_enabled: default_metrics_enabled(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_upload_bytes == 0 {
            return Err("server.max_upload_bytes must be greater than 0".to_string());
        }
        if let Some(base) = &self.public_base_url {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err(format!(
                    "server.public_base_url must be an absolute http(s) URL, got {base:?}"
                ));
            }
            if base.ends_with('/') {
                return Err("server.public_base_url must not end with '/'".to_string());
            }
        }
        Ok(())
    }
}

/// Authentication and session configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// bcrypt work factor for new password hashes.
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    /// Absolute session lifetime in seconds (default: 24 hours).
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Name of the session cookie.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Add the `Secure` attribute to the session cookie.
    /// Enable whenever the portal is served over HTTPS.
    #[serde(default)]
    pub secure_cookie: bool,
    /// Interval in seconds between sweeps of expired sessions.
    #[serde(default = "default_session_sweep_interval_secs")]
    pub session_sweep_interval_secs: u64,
}

fn default_bcrypt_cost() -> u32 {
    10
}

fn default_session_ttl_secs() -> u64 {
    86400 // 24 hours
}

fn default_cookie_name() -> String {
    "portal_session".to_string()
}

fn default_session_sweep_interval_secs() -> u64 {
    300
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: default_bcrypt_cost(),
            session_ttl_secs: default_session_ttl_secs(),
            cookie_name: default_cookie_name(),
            secure_cookie: false,
            session_sweep_interval_secs: default_session_sweep_interval_secs(),
        }
    }
}

impl AuthConfig {
    /// Get the session lifetime as a Duration.
    pub fn session_ttl(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.session_ttl_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(format!(
                "auth.bcrypt_cost must be between 4 and 31, got {}",
                self.bcrypt_cost
            ));
        }
        if self.session_ttl_secs == 0 {
            return Err("auth.session_ttl_secs cannot be 0".to_string());
        }
        if self.session_sweep_interval_secs == 0 {
            return Err("auth.session_sweep_interval_secs cannot be 0. \
                 Use a value >= 1 second."
                .to_string());
        }
        let valid_cookie_name = !self.cookie_name.is_empty()
            && self
                .cookie_name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid_cookie_name {
            return Err(format!(
                "auth.cookie_name {:?} must be non-empty and contain only [A-Za-z0-9_-]",
                self.cookie_name
            ));
        }
        Ok(())
    }
}

/// Bootstrap administrator.
///
/// When present, the server ensures this account exists with the admin flag
/// set on every startup. If the configured hash changes between restarts the
/// stored hash is replaced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminConfig {
    pub username: String,
    pub email: String,
    /// Pre-computed bcrypt hash of the admin password.
    /// Generate with: `htpasswd -bnBC 10 "" 'your-password' | tr -d ':\n'`
    pub password_hash: String,
}

impl AdminConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.username.trim().is_empty() {
            return Err("admin.username cannot be empty".to_string());
        }
        if !self.email.contains('@') {
            return Err("admin.email must be an email address".to_string());
        }
        let hash = self.password_hash.as_str();
        let looks_like_bcrypt = hash.len() == 60
            && (hash.starts_with("$2a$") || hash.starts_with("$2b$") || hash.starts_with("$2y$"));
        if !looks_like_bcrypt {
            return Err("admin.password_hash must be a bcrypt hash ($2b$...)".to_string());
        }
        Ok(())
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to AWS_ACCESS_KEY_ID env var if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to AWS_SECRET_ACCESS_KEY env var if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        secret_access_key: Option<String>,
        /// Force path-style URLs (e.g., `endpoint/bucket/key` instead of `bucket.endpoint/key`).
        /// Required for MinIO and some S3-compatible services.
        #[serde(default)]
        force_path_style: bool,
        /// Public origin the bucket is reachable under (bucket website, CDN).
        /// When set, artifact URLs point there instead of at this server.
        #[serde(default)]
        public_url: Option<String>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/artifacts"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                access_key_id,
                secret_access_key,
                ..
            } => match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                (Some(_), Some(_)) | (None, None) => Ok(()),
                _ => Err(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ),
            },
            _ => Ok(()),
        }
    }
}

/// Metadata store configuration (SQLite).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Database file path.
    #[serde(default = "default_metadata_path")]
    pub path: PathBuf,
    /// Maximum connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("./data/portal.db")
}

fn default_max_connections() -> u32 {
    1
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Rate limiting configuration.
///
/// Two independent sliding windows keyed by client IP: one for login
/// attempts and one for all API traffic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Login window length in seconds (default: 15 minutes).
    #[serde(default = "default_login_window_secs")]
    pub login_window_secs: u64,
    /// Login attempts allowed per window.
    #[serde(default = "default_login_max_attempts")]
    pub login_max_attempts: u32,
    /// API window length in seconds (default: 1 minute).
    #[serde(default = "default_api_window_secs")]
    pub api_window_secs: u64,
    /// API requests allowed per window.
    #[serde(default = "default_api_max_requests")]
    pub api_max_requests: u32,
    /// Trusted proxy IP addresses/CIDR ranges.
    /// Only requests from these IPs will have X-Forwarded-For/X-Real-IP headers trusted.
    /// If empty, forwarded headers are never trusted (only direct connection IP is used).
    /// Use ["*"] to trust all proxies (NOT recommended for production).
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    /// Maximum number of unique clients tracked per limiter (default: 100000).
    /// When the limit is reached, new clients are rejected with 429 until cleanup runs.
    #[serde(default = "default_max_tracked_clients")]
    pub max_tracked_clients: u32,
    /// Interval in seconds between cleanup sweeps of idle clients (default: 60).
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_login_window_secs() -> u64 {
    15 * 60
}

fn default_login_max_attempts() -> u32 {
    5
}

fn default_api_window_secs() -> u64 {
    60
}

fn default_api_max_requests() -> u32 {
    100
}

fn default_max_tracked_clients() -> u32 {
    100_000
}

fn default_cleanup_interval_secs() -> u64 {
    60 // Sweep every minute
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            login_window_secs: default_login_window_secs(),
            login_max_attempts: default_login_max_attempts(),
            api_window_secs: default_api_window_secs(),
            api_max_requests: default_api_max_requests(),
            trusted_proxies: Vec::new(),
            max_tracked_clients: default_max_tracked_clients(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Validate rate limit configuration for dangerous settings.
    /// Returns warnings for configs that are insecure but allowed,
    /// and errors for configs that are unsafe and should be rejected.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if !self.enabled {
            return Ok(warnings);
        }

        // tokio::time::interval panics on a zero period
        if self.cleanup_interval_secs == 0 {
            return Err("rate_limit.cleanup_interval_secs cannot be 0. \
                 Use a value >= 1 second."
                .to_string());
        }

        if self.login_window_secs == 0 || self.api_window_secs == 0 {
            return Err("rate_limit window lengths must be at least 1 second".to_string());
        }

        if self.login_max_attempts == 0 || self.api_max_requests == 0 {
            return Err("rate_limit maximums must be at least 1".to_string());
        }

        if self.trusted_proxies.len() == 1 && self.trusted_proxies[0] == "*" {
            warnings.push(
                "rate_limit.trusted_proxies=['*'] trusts ALL forwarded headers. \
                 This allows clients to spoof their IP address and bypass rate limits. \
                 Only use this setting in development or behind a trusted reverse proxy."
                    .to_string(),
            );
        }

        Ok(warnings)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Authentication and session configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Bootstrap administrator (optional).
    #[serde(default)]
    pub admin: Option<AdminConfig>,
    /// Rate limiting configuration.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage, SQLite metadata,
    /// the minimum bcrypt cost and no rate limiting.
    pub fn for_testing() -> Self {
        Self {
            auth: AuthConfig {
                bcrypt_cost: 4,
                ..AuthConfig::default()
            },
            rate_limit: RateLimitConfig {
                enabled: false,
                ..RateLimitConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate the whole configuration tree.
    /// Returns the accumulated warnings on success.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        self.server.validate()?;
        self.auth.validate()?;
        self.storage.validate()?;
        if let Some(admin) = &self.admin {
            admin.validate()?;
        }
        let mut warnings = self.rate_limit.validate()?;
        let https_origin = self
            .server
            .public_base_url
            .as_deref()
            .is_some_and(|base| base.starts_with("https://"));
        if https_origin && !self.auth.secure_cookie {
            warnings.push(
                "server.public_base_url is https but auth.secure_cookie=false: \
                 session cookies will also be sent over plain HTTP."
                    .to_string(),
            );
        }
        Ok(warnings)
    }
}
