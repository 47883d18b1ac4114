//! Client identity resolution.
//!
//! Every request is tagged with a [`ClientInfo`] carrying the caller's IP and
//! user agent. Rate limiting keys on the IP and the event logs record both.
//!
//! # Security Note
//!
//! By default, X-Forwarded-For and X-Real-IP headers are NOT trusted to prevent
//! IP spoofing. Configure `rate_limit.trusted_proxies` to enable header-based
//! IP detection:
//!
//! - Empty list (default): Only direct connection IP is used
//! - List of IPs/CIDRs: Headers trusted only when request comes from these IPs
//! - ["*"]: Trust headers from all sources (NOT recommended for production)

use crate::state::AppState;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use ipnet::IpNet;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};

/// Placeholder used when the peer address is not available.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Longest user agent string kept for logging.
const MAX_USER_AGENT_LEN: usize = 512;

/// A parsed trusted proxy entry (either an IP or CIDR range).
#[derive(Clone, Debug)]
pub enum TrustedEntry {
    Ip(IpAddr),
    Cidr(IpNet),
}

/// Trusted proxy configuration for IP extraction.
#[derive(Debug)]
pub enum TrustedProxies {
    /// Never trust forwarded headers (default, most secure).
    None,
    /// Trust headers from all sources (dangerous, for development only).
    All,
    /// Trust headers only from specific IPs/CIDRs.
    List(Vec<TrustedEntry>),
}

impl TrustedProxies {
    pub fn from_config(proxies: &[String]) -> Self {
        if proxies.is_empty() {
            Self::None
        } else if proxies.len() == 1 && proxies[0] == "*" {
            Self::All
        } else {
            let entries: Vec<TrustedEntry> = proxies
                .iter()
                .filter_map(|p| {
                    if p.contains('/') {
                        match p.parse::<IpNet>() {
                            Ok(net) => Some(TrustedEntry::Cidr(net)),
                            Err(e) => {
                                tracing::warn!("Invalid CIDR in trusted_proxies: '{}': {}", p, e);
                                None
                            }
                        }
                    } else {
                        match p.parse::<IpAddr>() {
                            Ok(ip) => Some(TrustedEntry::Ip(ip)),
                            Err(e) => {
                                tracing::warn!("Invalid IP in trusted_proxies: '{}': {}", p, e);
                                None
                            }
                        }
                    }
                })
                .collect();
            Self::List(entries)
        }
    }

    /// Check if the given connection IP is a trusted proxy.
    pub fn is_trusted(&self, connection_ip: Option<IpAddr>) -> bool {
        match (self, connection_ip) {
            (Self::None, _) => false,
            (Self::All, _) => true,
            // Without ConnectInfo there is no way to verify a listed proxy.
            (Self::List(_), None) => false,
            (Self::List(entries), Some(ip)) => entries.iter().any(|entry| match entry {
                TrustedEntry::Ip(trusted) => *trusted == ip,
                TrustedEntry::Cidr(network) => network.contains(&ip),
            }),
        }
    }
}

/// Caller identity attached to every request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

impl ClientInfo {
    /// Identity used when the middleware did not run.
    pub fn unknown() -> Self {
        Self {
            ip: UNKNOWN_CLIENT.to_string(),
            user_agent: String::new(),
        }
    }

    /// Resolve the client from the peer address and headers.
    pub fn resolve(peer: Option<IpAddr>, headers: &HeaderMap, trusted: &TrustedProxies) -> Self {
        let forwarded = if trusted.is_trusted(peer) {
            forwarded_ip(headers)
        } else {
            None
        };

        let ip = forwarded
            .or_else(|| peer.map(|ip| ip.to_string()))
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect())
            .unwrap_or_default();

        Self { ip, user_agent }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<ClientInfo>()
            .cloned()
            .unwrap_or_else(ClientInfo::unknown))
    }
}

/// First address of X-Forwarded-For, else X-Real-IP. Unparseable values are ignored.
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(s) = forwarded.to_str()
        && let Some(first) = s.split(',').next()
        && let Ok(ip) = first.trim().parse::<IpAddr>()
    {
        return Some(ip.to_string());
    }

    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(s) = real_ip.to_str()
        && let Ok(ip) = s.trim().parse::<IpAddr>()
    {
        return Some(ip.to_string());
    }

    None
}

static CONNECT_INFO_WARNED: AtomicBool = AtomicBool::new(false);

/// Resolve [`ClientInfo`] and store it in the request extensions.
pub async fn client_info_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip());

    if peer.is_none() && !CONNECT_INFO_WARNED.swap(true, Ordering::Relaxed) {
        tracing::warn!(
            "ConnectInfo not available. All clients share the '{}' identity; serve with \
             into_make_service_with_connect_info::<SocketAddr>() to enable per-IP limits.",
            UNKNOWN_CLIENT
        );
    }

    let client = ClientInfo::resolve(peer, req.headers(), &state.trusted_proxies);
    req.extensions_mut().insert(client);
    next.run(req).await
}
