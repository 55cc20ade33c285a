//! Domain types and trait seams shared by every keeper crate.
//!
//! This crate has no internal dependencies: stores, clients and the garbage
//! collector all meet on the types and traits defined here.

pub mod access_rights;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod project_lock;
pub mod projects;
pub mod resource;
pub mod roles;
pub mod store;
pub mod types;
pub mod users;
