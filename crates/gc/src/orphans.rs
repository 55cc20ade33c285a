//! Sweep 3: services no open project accounts for.
//!
//! Runs after the disconnect sweep, so the set of open projects reflects
//! the sessions that survived it.

use std::collections::HashSet;

use keeper_core::orchestrator::RunningService;
use keeper_core::resource::fields;
use keeper_core::types::{NodeId, ProjectId};

use crate::collector::{GarbageCollector, GcReport};
use crate::error::GcError;

impl GarbageCollector {
    pub(crate) async fn sweep_orphaned_services(&self) -> Result<GcReport, GcError> {
        let open_nodes = self.open_node_ids().await?;

        let services = match self.deps.orchestrator.list_running_services().await {
            Ok(services) => services,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Could not list running services, skipping orphan sweep"
                );
                return Ok(GcReport::default());
            }
        };

        let open_nodes = &open_nodes;
        Ok(self
            .fan_out(services, |service| async move {
                match self.collect_service(&service, open_nodes).await {
                    Ok(true) => GcReport {
                        services_stopped: 1,
                        ..GcReport::default()
                    },
                    Ok(false) => GcReport::default(),
                    Err(e) => {
                        tracing::warn!(
                            service_uuid = %service.service_uuid,
                            error = %e,
                            "Failed to inspect service"
                        );
                        GcReport::default()
                    }
                }
            })
            .await)
    }

    /// Node ids of every project some alive session has open.
    async fn open_node_ids(&self) -> Result<HashSet<NodeId>, GcError> {
        let (alive, _) = self.deps.registry.get_all_keys().await?;

        let mut open_projects: HashSet<ProjectId> = HashSet::new();
        for key in &alive {
            let resources = self.deps.registry.get_resources(key).await?;
            if let Some(project_id) = resources
                .get(fields::PROJECT_ID)
                .and_then(|v| v.parse::<ProjectId>().ok())
            {
                open_projects.insert(project_id);
            }
        }

        let mut nodes = HashSet::new();
        for project_id in open_projects {
            nodes.extend(self.deps.projects.get_workbench_node_ids(project_id).await?);
        }
        Ok(nodes)
    }

    /// Returns `true` if the service was stopped.
    async fn collect_service(
        &self,
        service: &RunningService,
        open_nodes: &HashSet<NodeId>,
    ) -> Result<bool, GcError> {
        let node_id = service.service_uuid;

        if !self.deps.projects.node_id_in_any_workbench(node_id).await? {
            tracing::info!(%node_id, "Stopping service of a node that no longer exists");
            return Ok(self.stop_service(node_id, false).await);
        }

        if open_nodes.contains(&node_id) {
            return Ok(false);
        }
        if service.service_state.is_starting_up() {
            tracing::debug!(
                %node_id,
                state = ?service.service_state,
                "Service still starting, skipping"
            );
            return Ok(false);
        }

        let save_state = self.may_save_state(service).await;
        tracing::info!(
            %node_id,
            project_id = %service.project_id,
            save_state,
            "Stopping orphaned service"
        );
        Ok(self.stop_service(node_id, save_state).await)
    }

    /// State is saved only for a real, non-guest user with write access.
    async fn may_save_state(&self, service: &RunningService) -> bool {
        let Some(user_id) = service.valid_user_id() else {
            return false;
        };
        let check = async {
            Ok::<_, GcError>(
                !self.is_guest_cached(user_id).await?
                    && self
                        .deps
                        .projects
                        .has_write_permission(user_id, service.project_id)
                        .await?,
            )
        };
        match check.await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::debug!(
                    user_id,
                    error = %e,
                    "Cannot confirm write access, not saving state"
                );
                false
            }
        }
    }
}
