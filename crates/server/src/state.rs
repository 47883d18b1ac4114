//! Application state shared across handlers.

use crate::accounts::CredentialStore;
use crate::artifacts::ArtifactUploader;
use crate::auth::SessionAuthority;
use crate::client::TrustedProxies;
use crate::ratelimit::RateLimitState;
use crate::registry::VersionRegistry;
use crate::stats::StatsAggregator;
use portal_core::config::AppConfig;
use portal_metadata::MetadataStore;
use portal_storage::ObjectStore;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Artifact blob storage.
    pub storage: Arc<dyn ObjectStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Rate limiting state.
    pub rate_limit: RateLimitState,
    /// Proxies whose forwarding headers are honoured.
    pub trusted_proxies: Arc<TrustedProxies>,
    pub credentials: Arc<CredentialStore>,
    pub sessions: Arc<SessionAuthority>,
    pub uploads: Arc<ArtifactUploader>,
    pub registry: Arc<VersionRegistry>,
    pub stats: Arc<StatsAggregator>,
}

impl AppState {
    /// Wire the services together.
    ///
    /// Configuration is expected to be validated already; warnings are
    /// logged again here so embedded routers surface them too.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        if let Ok(warnings) = config.rate_limit.validate() {
            for warning in warnings {
                tracing::warn!("Configuration warning: {}", warning);
            }
        }

        let rate_limit = RateLimitState::new(&config.rate_limit);
        let trusted_proxies = TrustedProxies::from_config(&config.rate_limit.trusted_proxies);

        let credentials = CredentialStore::new(metadata.clone(), config.auth.bcrypt_cost);
        let sessions = SessionAuthority::new(metadata.clone(), config.auth.session_ttl());
        let uploads = ArtifactUploader::new(storage.clone(), config.server.public_base_url.clone());
        let registry = VersionRegistry::new(metadata.clone());
        let stats = StatsAggregator::new(metadata.clone());

        Self {
            config: Arc::new(config),
            storage,
            metadata,
            rate_limit,
            trusted_proxies: Arc::new(trusted_proxies),
            credentials: Arc::new(credentials),
            sessions: Arc::new(sessions),
            uploads: Arc::new(uploads),
            registry: Arc::new(registry),
            stats: Arc::new(stats),
        }
    }

    /// Get the cleanup interval for the rate limiter, if enabled.
    /// Returns a default of 60 seconds if the interval is configured as zero
    /// (`tokio::time::interval` panics on zero).
    pub fn rate_limit_cleanup_interval(&self) -> Option<Duration> {
        if !self.rate_limit.is_enabled() {
            return None;
        }
        match self.config.rate_limit.cleanup_interval_secs {
            0 => {
                tracing::warn!("rate_limit.cleanup_interval_secs is 0, using default of 60 seconds");
                Some(Duration::from_secs(60))
            }
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Interval of the expired-session sweeper, never zero.
    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.config.auth.session_sweep_interval_secs.max(1))
    }
}
