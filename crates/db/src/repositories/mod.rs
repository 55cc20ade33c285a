//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod group_repo;
pub mod lock_repo;
pub mod project_repo;
pub mod session_repo;
pub mod user_repo;

pub use group_repo::GroupRepo;
pub use lock_repo::LockRepo;
pub use project_repo::ProjectRepo;
pub use session_repo::{SessionLivenessRepo, SessionResourceRepo};
pub use user_repo::UserRepo;
