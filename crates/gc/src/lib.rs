//! Resource garbage collector.
//!
//! Periodically reclaims what disconnected client sessions left behind:
//! running services of projects nobody has open anymore, guest accounts
//! and their projects, and services orphaned by a crash. See
//! [`collector::GarbageCollector`] for the sweeps and [`controller`] for the
//! background loop.

pub mod cache;
pub mod collector;
pub mod config;
pub mod controller;
pub mod error;

mod disconnect;
mod guests;
mod orphans;

pub use collector::{GarbageCollector, GcDeps, GcReport};
pub use config::GcConfig;
pub use controller::GcHandle;
pub use error::GcError;
