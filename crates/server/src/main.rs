//! Portal server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use portal_core::config::AppConfig;
use portal_server::bootstrap::ensure_admin_user;
use portal_server::{AppState, create_router};
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Portal - software distribution and accounts server
#[derive(Parser, Debug)]
#[command(name = "portald")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "PORTAL_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Load configuration from an optional TOML file overlaid with `PORTAL_*`
/// environment variables.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!(config_path = %path, "No config file found, using defaults and environment");
    }

    figment
        .merge(Env::prefixed("PORTAL_").split("__"))
        .extract()
        .context("failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Portal v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;
    let warnings = config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    for warning in &warnings {
        tracing::warn!("Configuration warning: {}", warning);
    }

    portal_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = portal_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    // Fail fast instead of reporting healthy while storage is unreachable.
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend ready");

    let metadata = portal_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    match &config.admin {
        Some(admin) => ensure_admin_user(metadata.as_ref(), admin).await?,
        None => tracing::warn!("No bootstrap admin configured; uploads need an existing admin"),
    }

    let state = AppState::new(config.clone(), storage, metadata);

    if let Some(interval) = state.rate_limit_cleanup_interval() {
        portal_server::ratelimit::spawn_cleanup_task(state.rate_limit.clone(), interval);
        tracing::info!(
            interval_secs = interval.as_secs(),
            "Rate limiter cleanup task spawned"
        );
    }

    let sweep_interval = state.session_sweep_interval();
    portal_server::auth::spawn_session_sweeper(state.sessions.clone(), sweep_interval);
    tracing::info!(
        interval_secs = sweep_interval.as_secs(),
        "Session sweeper spawned"
    );

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    // ConnectInfo feeds per-IP rate limiting and event logging.
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_config_without_file_uses_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("absent.toml");
        let config = load_config(missing.to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert!(config.admin.is_none());
    }

    #[test]
    fn load_config_reads_toml_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("server.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[server]
bind = "0.0.0.0:9000"
max_upload_bytes = 1024

[auth]
cookie_name = "sid"

[storage]
type = "filesystem"
path = "/tmp/portal-artifacts"
"#
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.max_upload_bytes, 1024);
        assert_eq!(config.auth.cookie_name, "sid");
        config.validate().unwrap();
    }
}
