//! HTTP request handlers.

pub mod accounts;
pub mod common;
pub mod files;
pub mod stats;
pub mod versions;

pub use accounts::*;
pub use common::*;
pub use files::*;
pub use stats::*;
pub use versions::*;
