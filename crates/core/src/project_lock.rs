//! Project lock state and its persisted payload.
//!
//! A project lock is a named distributed mutex whose value carries the
//! project status and the identity of the holder. The value is stored as a
//! versioned JSON document so that replicas running different releases can
//! detect payloads they do not understand.

use serde::{Deserialize, Serialize};

use crate::types::{ProjectId, UserId};

/// Display name used when the garbage collector holds a project lock.
pub const GC_OWNER_DISPLAY_NAME: &str = "garbage collector";

/// Prefix of every project lock name in the lock store.
const PROJECT_LOCK_PREFIX: &str = "project_lock";

/// Name of the distributed lock guarding `project_id`.
pub fn project_lock_name(project_id: ProjectId) -> String {
    format!("{PROJECT_LOCK_PREFIX}:{project_id}")
}

/// Lifecycle status of a project as seen by its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Opening,
    Opened,
    Closing,
    Closed,
    Cloning,
}

impl ProjectStatus {
    /// Status reported once a lock taken with this status is released.
    pub fn settled(self) -> ProjectStatus {
        match self {
            ProjectStatus::Opening | ProjectStatus::Opened => ProjectStatus::Opened,
            ProjectStatus::Closing | ProjectStatus::Closed | ProjectStatus::Cloning => {
                ProjectStatus::Closed
            }
        }
    }
}

/// Identity of a lock holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub user_id: UserId,
    pub display_name: String,
}

impl Owner {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
        }
    }
}

/// Lock state of a project, as stored and as broadcast to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectLock {
    pub locked: bool,
    pub status: ProjectStatus,
    pub owner: Option<Owner>,
}

impl ProjectLock {
    pub fn held(status: ProjectStatus, owner: Owner) -> Self {
        Self {
            locked: true,
            status,
            owner: Some(owner),
        }
    }

    pub fn released(status: ProjectStatus) -> Self {
        Self {
            locked: false,
            status: status.settled(),
            owner: None,
        }
    }
}

/// Versioned envelope written into the lock store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "version")]
enum LockPayload {
    #[serde(rename = "1")]
    V1(ProjectLock),
}

/// Serialize a lock state into the store payload.
pub fn encode_payload(lock: &ProjectLock) -> Result<String, serde_json::Error> {
    serde_json::to_string(&LockPayload::V1(lock.clone()))
}

/// Parse a store payload. Unknown versions are an error.
pub fn decode_payload(payload: &str) -> Result<ProjectLock, serde_json::Error> {
    match serde_json::from_str::<LockPayload>(payload)? {
        LockPayload::V1(lock) => Ok(lock),
    }
}
