//! Prometheus metrics for the portal server.
//!
//! Exposes counters for logins, registrations, uploads, downloads and rate
//! limiting.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no user data, only aggregate usage. The endpoint MUST still be
//! network-restricted to authorized scrapers at the infrastructure level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Account metrics
pub static LOGINS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("portal_logins_total", "Login attempts by outcome"),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static REGISTRATIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "portal_registrations_total",
        "Total number of accounts registered",
    )
    .expect("metric creation failed")
});

pub static SESSIONS_SWEPT: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "portal_sessions_swept_total",
        "Total number of expired sessions deleted by the sweeper",
    )
    .expect("metric creation failed")
});

// Upload metrics
pub static UPLOADS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("portal_uploads_total", "Version uploads by outcome"),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static BYTES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "portal_bytes_uploaded_total",
        "Total artifact bytes written to storage",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "portal_upload_duration_seconds",
            "Time taken to store the artifacts of one version upload",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("metric creation failed")
});

// Download metrics
pub static DOWNLOADS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("portal_downloads_total", "Resolved downloads by platform"),
        &["platform"],
    )
    .expect("metric creation failed")
});

// Rate limiting metrics
pub static RATE_LIMIT_REJECTIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "portal_rate_limit_rejections_total",
            "Requests rejected by a rate limiter",
        ),
        &["limiter"],
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so integration tests may build many routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(LOGINS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REGISTRATIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SESSIONS_SWEPT.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOADS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DOWNLOADS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RATE_LIMIT_REJECTIONS.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Count a login attempt.
pub fn record_login(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    LOGINS.with_label_values(&[outcome]).inc();
}

/// Count a finished version upload.
pub fn record_upload(outcome: &str) {
    UPLOADS.with_label_values(&[outcome]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        // Panics if any metric creation failed
        register_metrics();
        register_metrics();
    }

    #[tokio::test]
    async fn test_metrics_are_exported() {
        register_metrics();
        record_login(true);
        DOWNLOADS.with_label_values(&["linux"]).inc();

        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("portal_logins_total"));
        assert!(text.contains("portal_downloads_total{platform=\"linux\"}"));
    }
}
