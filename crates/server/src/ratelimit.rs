//! Sliding-window rate limiting keyed by client IP.
//!
//! Two independent limiters are owned by [`RateLimitState`]:
//! - Login: applied to `POST /api/login` only (default 5 attempts per 15 minutes)
//! - API: applied to every `/api/*` route (default 100 requests per minute)
//!
//! Each limiter keeps the timestamps of admitted requests per client and
//! prunes them on every check. Rejected requests are not recorded, so a
//! client that keeps hammering is admitted again as soon as its oldest hit
//! leaves the window.
//!
//! # Memory Safety
//!
//! - At most `max_tracked_clients` clients are tracked per limiter
//! - A background task drops clients whose windows have emptied

use crate::client::ClientInfo;
use crate::error::ApiError;
use crate::metrics;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::{DashMap, mapref::entry::Entry};
use portal_core::config::RateLimitConfig;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Retry hint given to new clients while a limiter is full.
const AT_CAPACITY_RETRY_SECS: u64 = 60;

/// Which limiter rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limiter {
    Login,
    Api,
}

impl Limiter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Api => "api",
        }
    }
}

/// Reason for rate limit rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitReason {
    /// Request exceeded rate limit.
    RateLimited,
    /// Rate limiter at capacity, cannot track new clients.
    AtCapacity,
}

/// Error returned when rate limit is exceeded.
#[derive(Debug)]
pub struct RateLimitError {
    /// Number of seconds to wait before retrying.
    pub retry_after_secs: u64,
    pub reason: RateLimitReason,
    pub limiter: Limiter,
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        ApiError::RateLimited {
            retry_after_secs: err.retry_after_secs,
        }
    }
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// One sliding window: per-client timestamps of admitted requests.
struct SlidingWindow {
    limiter: Limiter,
    window: Duration,
    max_hits: usize,
    max_clients: usize,
    hits: DashMap<String, VecDeque<Instant>>,
    /// Whether the at-capacity warning has been logged (prevents log spam during floods).
    at_capacity_warned: AtomicBool,
}

impl SlidingWindow {
    fn new(limiter: Limiter, window: Duration, max_hits: u32, max_clients: u32) -> Self {
        Self {
            limiter,
            window,
            max_hits: max_hits as usize,
            max_clients: max_clients as usize,
            hits: DashMap::new(),
            at_capacity_warned: AtomicBool::new(false),
        }
    }

    fn prune(&self, hits: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = hits.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                hits.pop_front();
            } else {
                break;
            }
        }
    }

    fn check(&self, client: &str, now: Instant) -> Result<(), RateLimitError> {
        // DashMap::len() takes every shard lock, so it must run before entry()
        // grabs one. The bound may be overshot by the number of concurrent inserts.
        let at_capacity = self.hits.len() >= self.max_clients;

        match self.hits.entry(client.to_string()) {
            Entry::Occupied(mut entry) => {
                let hits = entry.get_mut();
                self.prune(hits, now);
                if hits.len() >= self.max_hits {
                    let retry_after_secs = hits
                        .front()
                        .map(|oldest| {
                            let elapsed = now.saturating_duration_since(*oldest);
                            ceil_secs(self.window.saturating_sub(elapsed))
                        })
                        .unwrap_or_else(|| ceil_secs(self.window));
                    return Err(RateLimitError {
                        retry_after_secs,
                        reason: RateLimitReason::RateLimited,
                        limiter: self.limiter,
                    });
                }
                hits.push_back(now);
            }
            Entry::Vacant(entry) => {
                if at_capacity {
                    if !self.at_capacity_warned.swap(true, Ordering::Relaxed) {
                        tracing::warn!(
                            limiter = self.limiter.as_str(),
                            max_clients = self.max_clients,
                            "Rate limiter at capacity, rejecting new clients until cleanup"
                        );
                    }
                    return Err(RateLimitError {
                        retry_after_secs: AT_CAPACITY_RETRY_SECS,
                        reason: RateLimitReason::AtCapacity,
                        limiter: self.limiter,
                    });
                }
                if self.max_hits == 0 {
                    return Err(RateLimitError {
                        retry_after_secs: ceil_secs(self.window),
                        reason: RateLimitReason::RateLimited,
                        limiter: self.limiter,
                    });
                }
                entry.insert(VecDeque::from([now]));
            }
        }
        Ok(())
    }

    /// Drop clients with no hits left in the window. Returns how many were dropped.
    fn cleanup(&self, now: Instant) -> usize {
        let before = self.hits.len();
        self.hits.retain(|_, hits| {
            self.prune(hits, now);
            !hits.is_empty()
        });
        let evicted = before.saturating_sub(self.hits.len());
        if evicted > 0 {
            self.at_capacity_warned.store(false, Ordering::Relaxed);
        }
        evicted
    }
}

/// Whole seconds, rounded up, never below one.
fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}

/// Rate limiter state shared across requests.
///
/// Cloning is cheap; clones share the same counters.
#[derive(Clone)]
pub struct RateLimitState {
    inner: Option<Arc<RateLimitStateInner>>,
}

/// Inner state that's only allocated when rate limiting is enabled.
struct RateLimitStateInner {
    login: SlidingWindow,
    api: SlidingWindow,
}

impl RateLimitState {
    /// Create a new rate limit state from configuration.
    pub fn new(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self { inner: None };
        }

        Self {
            inner: Some(Arc::new(RateLimitStateInner {
                login: SlidingWindow::new(
                    Limiter::Login,
                    Duration::from_secs(config.login_window_secs),
                    config.login_max_attempts,
                    config.max_tracked_clients,
                ),
                api: SlidingWindow::new(
                    Limiter::Api,
                    Duration::from_secs(config.api_window_secs),
                    config.api_max_requests,
                    config.max_tracked_clients,
                ),
            })),
        }
    }

    /// A state that admits everything.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Check if rate limiting is enabled.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Record a login attempt from `client`, or reject it.
    pub fn check_login(&self, client: &str) -> Result<(), RateLimitError> {
        self.check_login_at(client, Instant::now())
    }

    /// Record an API request from `client`, or reject it.
    pub fn check_api(&self, client: &str) -> Result<(), RateLimitError> {
        self.check_api_at(client, Instant::now())
    }

    pub fn check_login_at(&self, client: &str, now: Instant) -> Result<(), RateLimitError> {
        match &self.inner {
            Some(inner) => inner.login.check(client, now),
            None => Ok(()),
        }
    }

    pub fn check_api_at(&self, client: &str, now: Instant) -> Result<(), RateLimitError> {
        match &self.inner {
            Some(inner) => inner.api.check(client, now),
            None => Ok(()),
        }
    }

    /// Clean up clients with empty windows from both limiters.
    /// Returns the number of entries evicted.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    pub fn cleanup_at(&self, now: Instant) -> usize {
        let Some(inner) = &self.inner else {
            return 0;
        };

        let login_evicted = inner.login.cleanup(now);
        let api_evicted = inner.api.cleanup(now);
        let total_evicted = login_evicted + api_evicted;

        if total_evicted > 0 {
            tracing::debug!(
                login_evicted,
                api_evicted,
                login_entries = inner.login.hits.len(),
                api_entries = inner.api.hits.len(),
                "Rate limiter cleanup completed"
            );
        }
        total_evicted
    }

    /// Forget every recorded hit.
    pub fn reset(&self) {
        if let Some(inner) = &self.inner {
            inner.login.hits.clear();
            inner.api.hits.clear();
            inner.login.at_capacity_warned.store(false, Ordering::Relaxed);
            inner.api.at_capacity_warned.store(false, Ordering::Relaxed);
        }
    }

    /// Get the current number of tracked clients as `(login, api)`.
    pub fn entry_count(&self) -> (usize, usize) {
        match &self.inner {
            Some(inner) => (inner.login.hits.len(), inner.api.hits.len()),
            None => (0, 0),
        }
    }
}

fn reject(err: RateLimitError, client: &ClientInfo) -> Response {
    metrics::RATE_LIMIT_REJECTIONS
        .with_label_values(&[err.limiter.as_str()])
        .inc();
    tracing::info!(
        client_ip = %client.ip,
        limiter = err.limiter.as_str(),
        retry_after_secs = err.retry_after_secs,
        "Request rate limited"
    );
    err.into_response()
}

fn client_of(req: &Request) -> ClientInfo {
    req.extensions()
        .get::<ClientInfo>()
        .cloned()
        .unwrap_or_else(ClientInfo::unknown)
}

/// Per-IP limit for all API traffic.
pub async fn api_rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    if !rate_limit.is_enabled() {
        return next.run(req).await;
    }

    let client = client_of(&req);
    match rate_limit.check_api(&client.ip) {
        Ok(()) => next.run(req).await,
        Err(e) => reject(e, &client),
    }
}

/// Per-IP limit for login attempts, independent of credential correctness.
pub async fn login_rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    if !rate_limit.is_enabled() {
        return next.run(req).await;
    }

    let client = client_of(&req);
    match rate_limit.check_login(&client.ip) {
        Ok(()) => next.run(req).await,
        Err(e) => reject(e, &client),
    }
}

/// Spawn a background task that periodically cleans up idle rate limiter clients.
pub fn spawn_cleanup_task(
    state: RateLimitState,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let evicted = state.cleanup();
            if evicted > 0 {
                tracing::info!(evicted, "Rate limiter cleanup task evicted idle clients");
            }
        }
    })
}
