//! Notification side effects emitted on project lock changes.

use crate::project_lock::ProjectLock;
use crate::types::ProjectId;

/// Fire-and-forget sink for project lock state changes.
///
/// Implementations must not block; delivery failures are theirs to log.
pub trait Notifier: Send + Sync {
    fn notify_project_lock_state_changed(&self, project_id: ProjectId, state: &ProjectLock);
}

/// Notifier that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify_project_lock_state_changed(&self, _project_id: ProjectId, _state: &ProjectLock) {}
}
