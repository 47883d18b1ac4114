//! HTTP server for the distribution portal.
//!
//! This crate provides:
//! - Account registration and bcrypt credential verification
//! - Cookie sessions backed by the metadata store
//! - Per-IP rate limiting of logins and API calls
//! - Version publishing with per-platform artifact uploads
//! - Download resolution with event logging
//! - Admin statistics

pub mod accounts;
pub mod artifacts;
pub mod auth;
pub mod bootstrap;
pub mod client;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod ratelimit;
pub mod registry;
pub mod routes;
pub mod security;
pub mod state;
pub mod stats;

pub use auth::TraceId;
pub use client::ClientInfo;
pub use error::ApiError;
pub use ratelimit::RateLimitState;
pub use routes::create_router;
pub use state::AppState;
