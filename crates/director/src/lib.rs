//! HTTP client for the dynamic-service orchestrator (director API).

pub mod api;

pub use api::{DirectorApiError, DirectorClient};
