//! Metadata store abstraction and implementation for the distribution portal.
//!
//! This crate owns the relational data model:
//! - User accounts and login sessions
//! - Released versions and their download counters
//! - Append-only download and access event logs
//! - Aggregation queries for the admin dashboard

pub mod error;
pub mod models;
pub mod repos;
pub mod store;
mod timestamp;

pub use error::{MetadataError, MetadataResult};
pub use store::{MetadataStore, SqliteStore};

use portal_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    tracing::info!(path = %config.path.display(), "Opening SQLite metadata store");
    let store = SqliteStore::new(&config.path, config.max_connections).await?;
    Ok(Arc::new(store) as Arc<dyn MetadataStore>)
}
