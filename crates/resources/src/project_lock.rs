//! Project lock facade.
//!
//! Wraps the [`LockManager`] with project semantics: the lock value is a
//! versioned [`ProjectLock`] document carrying status and owner, and every
//! acquire/release is broadcast through the [`Notifier`] unless suppressed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use keeper_core::notify::Notifier;
use keeper_core::project_lock::{
    decode_payload, encode_payload, project_lock_name, Owner, ProjectLock, ProjectStatus,
};
use keeper_core::store::StoreError;
use keeper_core::types::ProjectId;

use crate::locks::{LockError, LockGuard, LockManager};

/// Whether lock changes are broadcast to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notify {
    Emit,
    /// For internal operations users should not see.
    Suppress,
}

#[derive(Clone)]
pub struct ProjectLockFacade {
    locks: LockManager,
    notifier: Arc<dyn Notifier>,
    ttl: Duration,
}

impl ProjectLockFacade {
    pub fn new(locks: LockManager, notifier: Arc<dyn Notifier>, ttl: Duration) -> Self {
        Self {
            locks,
            notifier,
            ttl,
        }
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    /// Lock `project_id` with `status` on behalf of `owner`.
    ///
    /// Fails with [`LockError::Held`] if anyone holds the project lock.
    pub async fn acquire(
        &self,
        project_id: ProjectId,
        status: ProjectStatus,
        owner: Owner,
        notify: Notify,
    ) -> Result<ProjectLockGuard, LockError> {
        let state = ProjectLock::held(status, owner);
        let payload = encode_payload(&state).map_err(|e| StoreError::Decode(e.to_string()))?;
        let guard = self
            .locks
            .try_lock(&project_lock_name(project_id), &payload, self.ttl)
            .await?;

        tracing::info!(%project_id, ?status, "Project locked");
        if notify == Notify::Emit {
            self.notifier
                .notify_project_lock_state_changed(project_id, &state);
        }

        Ok(ProjectLockGuard {
            guard: Some(guard),
            project_id,
            status,
            notify,
            notifier: Arc::clone(&self.notifier),
        })
    }

    /// Run `work` while holding the project lock.
    ///
    /// The lock is released after `work` completes. If the returned future
    /// is dropped midway, the guard's drop path releases it.
    pub async fn with_project_locked<F, T>(
        &self,
        project_id: ProjectId,
        status: ProjectStatus,
        owner: Owner,
        notify: Notify,
        work: F,
    ) -> Result<T, LockError>
    where
        F: Future<Output = T>,
    {
        let guard = self.acquire(project_id, status, owner, notify).await?;
        let output = work.await;
        if let Err(e) = guard.release().await {
            tracing::warn!(%project_id, error = %e, "Failed to release project lock");
        }
        Ok(output)
    }

    pub async fn is_locked(&self, project_id: ProjectId) -> Result<bool, LockError> {
        self.locks.is_locked(&project_lock_name(project_id)).await
    }

    /// Current lock state of `project_id`, `None` when unlocked.
    pub async fn get_lock_state(
        &self,
        project_id: ProjectId,
    ) -> Result<Option<ProjectLock>, LockError> {
        let Some(payload) = self.locks.get_payload(&project_lock_name(project_id)).await? else {
            return Ok(None);
        };
        let state = decode_payload(&payload).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(Some(state))
    }
}

/// A held project lock.
pub struct ProjectLockGuard {
    guard: Option<LockGuard>,
    project_id: ProjectId,
    status: ProjectStatus,
    notify: Notify,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for ProjectLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectLockGuard")
            .field("project_id", &self.project_id)
            .field("status", &self.status)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

impl ProjectLockGuard {
    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn status(&self) -> ProjectStatus {
        self.status
    }

    pub async fn release(mut self) -> Result<(), LockError> {
        let result = match self.guard.take() {
            Some(guard) => guard.release().await.map(|_| ()),
            None => Ok(()),
        };
        self.released_notice().emit();
        result
    }

    fn released_notice(&self) -> ReleasedNotice {
        ReleasedNotice {
            project_id: self.project_id,
            status: self.status,
            notify: self.notify,
            notifier: Arc::clone(&self.notifier),
        }
    }
}

impl Drop for ProjectLockGuard {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        let notice = self.released_notice();
        match tokio::runtime::Handle::try_current() {
            // Clients hear about the release only once the lease is gone.
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = guard.release().await {
                        tracing::warn!(
                            project_id = %notice.project_id,
                            error = %e,
                            "Failed to release dropped project lock"
                        );
                    }
                    notice.emit();
                });
            }
            Err(_) => {
                drop(guard);
                notice.emit();
            }
        }
    }
}

/// The "unlocked" broadcast of a released guard.
struct ReleasedNotice {
    project_id: ProjectId,
    status: ProjectStatus,
    notify: Notify,
    notifier: Arc<dyn Notifier>,
}

impl ReleasedNotice {
    fn emit(&self) {
        tracing::info!(project_id = %self.project_id, "Project unlocked");
        if self.notify == Notify::Emit {
            self.notifier.notify_project_lock_state_changed(
                self.project_id,
                &ProjectLock::released(self.status),
            );
        }
    }
}
