//! Dynamic-service orchestrator interface.
//!
//! The orchestrator runs one interactive service per workbench node of an
//! opened project. The garbage collector only needs to enumerate those
//! services and stop them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{NodeId, ProjectId, UserId};

/// Lifecycle state reported by the orchestrator for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Pending,
    Pulling,
    Starting,
    Running,
    Complete,
    Failed,
    #[serde(other)]
    Unknown,
}

impl ServiceState {
    /// `true` while the service image is still being pulled or started.
    /// Stopping such a service would cancel the pull.
    pub fn is_starting_up(self) -> bool {
        matches!(self, ServiceState::Pulling | ServiceState::Starting)
    }
}

/// A running dynamic service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningService {
    /// Same id as the workbench node the service belongs to.
    pub service_uuid: NodeId,
    pub service_host: String,
    pub service_state: ServiceState,
    /// Owning user, if the orchestrator reported a parseable one.
    pub user_id: Option<UserId>,
    pub project_id: ProjectId,
}

impl RunningService {
    /// Owning user id if it designates a real account.
    pub fn valid_user_id(&self) -> Option<UserId> {
        self.user_id.filter(|id| *id > 0)
    }
}

/// Errors from the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The service does not exist (anymore). Treated as a successful stop.
    #[error("Service {0} not found")]
    NotFound(NodeId),

    /// The orchestrator refused the operation, e.g. a service waiting for
    /// manual intervention.
    #[error("Operation refused by orchestrator: {0}")]
    Forbidden(String),

    /// The orchestrator could not be reached or failed internally.
    #[error("Orchestrator unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Every dynamic service currently known to the orchestrator.
    async fn list_running_services(&self) -> Result<Vec<RunningService>, OrchestratorError>;

    /// Dynamic services belonging to one project.
    async fn list_project_services(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<RunningService>, OrchestratorError> {
        Ok(self
            .list_running_services()
            .await?
            .into_iter()
            .filter(|s| s.project_id == project_id)
            .collect())
    }

    /// Stop a service, optionally persisting its state first.
    async fn stop_service(
        &self,
        service_uuid: NodeId,
        save_state: bool,
    ) -> Result<(), OrchestratorError>;
}
