//! Session resource registry and distributed locks.
//!
//! - [`ResourceRegistry`]: which client session holds which resources, and
//!   whether the session is still alive.
//! - [`SessionTracker`]: per-session façade used by request handlers.
//! - [`LockManager`] / [`ProjectLockFacade`]: non-blocking named leases and
//!   their project-level wrapper with status, owner and notifications.
//! - [`MemoryStore`]: in-process store backing all of the above.

pub mod locks;
pub mod memory;
pub mod notify;
pub mod project_lock;
pub mod registry;
pub mod tracker;

pub use locks::{guest_user_lock_name, LockError, LockGuard, LockManager};
pub use memory::MemoryStore;
pub use notify::{BroadcastNotifier, ProjectLockEvent};
pub use project_lock::{Notify, ProjectLockFacade, ProjectLockGuard};
pub use registry::ResourceRegistry;
pub use tracker::{SessionResources, SessionTracker, TrackerTtls};
