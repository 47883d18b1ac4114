//! Repository traits for metadata operations.

pub mod events;
pub mod sessions;
pub mod stats;
pub mod users;
pub mod versions;

pub use events::EventRepo;
pub use sessions::SessionRepo;
pub use stats::StatsRepo;
pub use users::UserRepo;
pub use versions::VersionRepo;
