//! Route configuration.

use crate::auth::{session_middleware, trace_id_middleware};
use crate::client::client_info_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::ratelimit::{api_rate_limit_middleware, login_rate_limit_middleware};
use crate::security::{cors_layer, security_headers_middleware};
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Body limit of the JSON endpoints.
const JSON_BODY_LIMIT: usize = 1024 * 1024;

/// Headroom for multipart boundaries and text fields on top of the file bytes.
const MULTIPART_SLACK: usize = 64 * 1024;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let rate_limit = state.rate_limit.clone();
    let upload_limit = usize::try_from(state.config.server.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_SLACK);

    // Login reads no session.
    let login_routes = Router::new().route(
        "/login",
        post(handlers::login).route_layer(middleware::from_fn_with_state(
            rate_limit.clone(),
            login_rate_limit_middleware,
        )),
    );

    let session_routes = Router::new()
        // Health check (intentionally unauthenticated for load balancers/probes)
        .route("/health", get(handlers::health_check))
        // Accounts
        .route("/register", post(handlers::register))
        .route("/logout", post(handlers::logout))
        .route("/check-admin", get(handlers::check_admin))
        // Versions
        .route(
            "/versions",
            get(handlers::list_versions)
                .post(handlers::create_version)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/download/{version_id}/{platform}",
            get(handlers::download),
        )
        // Statistics (admin only)
        .route("/stats/downloads", get(handlers::download_stats))
        .route("/stats/users", get(handlers::user_stats))
        .route("/stats/platforms", get(handlers::platform_stats))
        .route("/stats/access", get(handlers::access_stats))
        .route("/stats/summary", get(handlers::summary_stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ));

    // API limiting runs before session resolution.
    let api_routes = session_routes
        .merge(login_routes)
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .layer(middleware::from_fn_with_state(
            rate_limit,
            api_rate_limit_middleware,
        ));

    let mut router = Router::new()
        .nest("/api", api_routes)
        .route("/files/{*key}", get(handlers::get_file))
        .fallback(handlers::not_found);

    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    // Layers run outermost first:
    // TraceLayer -> CORS -> security headers -> trace id -> client info
    //   -> API limiter -> session -> handler
    let router = router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            client_info_middleware,
        ))
        .layer(middleware::from_fn(trace_id_middleware))
        .layer(middleware::from_fn(security_headers_middleware));

    let router = match cors_layer(&state.config.server) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
