//! Distributed lock manager.
//!
//! Locks are leases in a [`LockStore`]: acquiring never blocks, it either
//! takes the lease or fails with [`LockError::Held`]. While a [`LockGuard`]
//! is alive a background task keeps pushing the lease expiry forward.
//!
//! Release happens on every exit path:
//! - explicitly through [`LockGuard::release`];
//! - on drop (early return, `?`, panic, task cancellation) through a release
//!   task spawned on the current runtime;
//! - as a last resort when the lease TTL lapses, e.g. if the process dies.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use keeper_core::store::{LockStore, StoreError};
use keeper_core::types::UserId;
use tokio::task::JoinHandle;

/// Smallest interval between two lease extensions.
const MIN_EXTEND_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another holder owns a live lease on the lock.
    #[error("Lock {0} is held elsewhere")]
    Held(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Name of the lock held while a guest account for `user` (id or name) is
/// being created and initialized.
pub fn guest_user_lock_name(user: impl Display) -> String {
    format!("{user}:guest_user_rc_lock")
}

#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
}

impl LockManager {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// Take the lock `name` with `payload` for a lease of `ttl`.
    pub async fn try_lock(
        &self,
        name: &str,
        payload: &str,
        ttl: Duration,
    ) -> Result<LockGuard, LockError> {
        let token = uuid::Uuid::new_v4().to_string();
        if !self.store.try_acquire(name, &token, payload, ttl).await? {
            return Err(LockError::Held(name.to_string()));
        }
        tracing::debug!(lock = name, ttl_secs = ttl.as_secs(), "Lock acquired");

        let extender = spawn_extender(
            Arc::clone(&self.store),
            name.to_string(),
            token.clone(),
            ttl,
        );
        Ok(LockGuard {
            store: Arc::clone(&self.store),
            name: name.to_string(),
            token,
            extender: Some(extender),
            released: false,
        })
    }

    pub async fn is_locked(&self, name: &str) -> Result<bool, LockError> {
        Ok(self.store.is_locked(name).await?)
    }

    pub async fn get_payload(&self, name: &str) -> Result<Option<String>, LockError> {
        Ok(self.store.get_payload(name).await?)
    }

    /// Hold the construction lock of a guest account while it is created.
    pub async fn lock_guest_user(
        &self,
        user: impl Display,
        ttl: Duration,
    ) -> Result<LockGuard, LockError> {
        self.try_lock(&guest_user_lock_name(user), "", ttl).await
    }

    /// `true` if the guest construction lock is held under the user's id or
    /// (during construction, before the id exists) under its name.
    pub async fn is_guest_user_locked(
        &self,
        user_id: UserId,
        user_name: Option<&str>,
    ) -> Result<bool, LockError> {
        if self.is_locked(&guest_user_lock_name(user_id)).await? {
            return Ok(true);
        }
        match user_name {
            Some(name) => self.is_locked(&guest_user_lock_name(name)).await,
            None => Ok(false),
        }
    }
}

fn spawn_extender(
    store: Arc<dyn LockStore>,
    name: String,
    token: String,
    ttl: Duration,
) -> JoinHandle<()> {
    let period = (ttl / 3).max(MIN_EXTEND_PERIOD);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            match store.extend(&name, &token, ttl).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(lock = %name, "Lock lease lost, stopping extension");
                    break;
                }
                Err(e) => {
                    tracing::warn!(lock = %name, error = %e, "Failed to extend lock lease");
                }
            }
        }
    })
}

/// A held lock. See the module docs for the release guarantees.
pub struct LockGuard {
    store: Arc<dyn LockStore>,
    name: String,
    token: String,
    extender: Option<JoinHandle<()>>,
    released: bool,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("name", &self.name)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl LockGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the lock now.
    ///
    /// Returns `false` if the lease had already been lost (expired and taken
    /// over or removed).
    pub async fn release(mut self) -> Result<bool, LockError> {
        if let Some(handle) = self.extender.take() {
            handle.abort();
        }
        let result = self.store.release(&self.name, &self.token).await;
        self.released = true;
        tracing::debug!(lock = %self.name, "Lock released");
        Ok(result?)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.extender.take() {
            handle.abort();
        }
        if self.released {
            return;
        }

        let store = Arc::clone(&self.store);
        let name = std::mem::take(&mut self.name);
        let token = std::mem::take(&mut self.token);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match store.release(&name, &token).await {
                        Ok(_) => tracing::debug!(lock = %name, "Lock released on drop"),
                        Err(e) => tracing::warn!(
                            lock = %name,
                            error = %e,
                            "Failed to release dropped lock"
                        ),
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    lock = %name,
                    "No runtime to release dropped lock, lease will expire"
                );
            }
        }
    }
}
