//! In-process broadcast of project lock changes.
//!
//! [`BroadcastNotifier`] fans [`ProjectLockEvent`]s out over a
//! `tokio::sync::broadcast` channel. The websocket layer subscribes and
//! forwards each event to the clients that have the project open.

use keeper_core::notify::Notifier;
use keeper_core::project_lock::ProjectLock;
use keeper_core::types::ProjectId;
use serde::Serialize;
use tokio::sync::broadcast;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// A project lock state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectLockEvent {
    pub project_id: ProjectId,
    pub state: ProjectLock,
}

pub struct BroadcastNotifier {
    sender: broadcast::Sender<ProjectLockEvent>,
}

impl BroadcastNotifier {
    /// When the buffer is full the oldest events are dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProjectLockEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Notifier for BroadcastNotifier {
    fn notify_project_lock_state_changed(&self, project_id: ProjectId, state: &ProjectLock) {
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(ProjectLockEvent {
            project_id,
            state: state.clone(),
        });
    }
}
