//! Sweep 1: resources of dead session keys.
//!
//! A resource is released only when no *other* key holding the same value
//! is alive, re-checked right before the release. Project releases run
//! under the project lock, and the holders are stripped before the lock is
//! let go, so concurrent collectors release a given project once.

use keeper_core::project_lock::{Owner, ProjectStatus, GC_OWNER_DISPLAY_NAME};
use keeper_core::resource::{fields, ResourceKey};
use keeper_core::types::ProjectId;
use keeper_resources::{LockError, Notify};

use crate::collector::{GarbageCollector, GcReport};
use crate::error::GcError;

/// What happened to one field of a dead key.
enum FieldOutcome {
    /// Another holder is alive; only this key let go of it.
    StillInUse,
    /// Released and stripped from every dead holder.
    Released,
    /// Someone else holds the project lock; retry next cycle.
    Busy,
    /// A previous lock holder already released it.
    AlreadyReleased,
}

impl GarbageCollector {
    pub(crate) async fn sweep_disconnected(&self) -> Result<GcReport, GcError> {
        let (_, dead) = self.deps.registry.get_all_keys().await?;
        if dead.is_empty() {
            return Ok(GcReport::default());
        }
        tracing::debug!(count = dead.len(), "Processing dead session keys");

        Ok(self
            .fan_out(dead, |key| async move {
                match self.collect_dead_key(&key).await {
                    Ok(report) => report,
                    Err(e) => {
                        tracing::warn!(%key, error = %e, "Failed to collect dead key");
                        GcReport::default()
                    }
                }
            })
            .await)
    }

    async fn collect_dead_key(&self, key: &ResourceKey) -> Result<GcReport, GcError> {
        let mut report = GcReport::default();

        if self
            .deps
            .project_locks
            .lock_manager()
            .is_guest_user_locked(key.user_id, None)
            .await?
        {
            tracing::debug!(%key, "User is under construction, skipping key");
            return Ok(report);
        }

        let resources = self.deps.registry.get_resources(key).await?;
        if resources.is_empty() {
            // Conditional removal: a heartbeat may have revived the key
            // since the partition.
            if self.deps.registry.prune_if_empty(key).await? {
                report.keys_pruned += 1;
            }
        } else {
            for (field, value) in &resources {
                match self.collect_field(key, field, value).await {
                    Ok(FieldOutcome::Released) => report.resources_released += 1,
                    Ok(FieldOutcome::StillInUse | FieldOutcome::AlreadyReleased) => {}
                    Ok(FieldOutcome::Busy) => {
                        tracing::debug!(%key, field, value, "Resource busy, will retry");
                    }
                    Err(e) => {
                        tracing::warn!(
                            %key,
                            field,
                            value,
                            error = %e,
                            "Failed to release resource"
                        );
                    }
                }
            }
            if self.deps.registry.prune_if_empty(key).await? {
                report.keys_pruned += 1;
            }
        }

        if report.keys_pruned > 0 && self.remove_guest_if_unreferenced(key).await {
            report.guests_removed += 1;
        }
        Ok(report)
    }

    async fn collect_field(
        &self,
        key: &ResourceKey,
        field: &str,
        value: &str,
    ) -> Result<FieldOutcome, GcError> {
        let mut other_dead = Vec::new();
        for other in self.deps.registry.find_keys(field, value).await? {
            if &other == key {
                continue;
            }
            if self.deps.registry.is_alive(&other).await? {
                self.deps.registry.remove_resource(key, field).await?;
                return Ok(FieldOutcome::StillInUse);
            }
            other_dead.push(other);
        }

        if field != fields::PROJECT_ID {
            self.strip(key, &other_dead, field, value).await?;
            return Ok(FieldOutcome::Released);
        }

        let Ok(project_id) = value.parse::<ProjectId>() else {
            tracing::warn!(%key, value, "Dropping malformed project id");
            self.strip(key, &other_dead, field, value).await?;
            return Ok(FieldOutcome::Released);
        };

        let owner = Owner::new(key.user_id, GC_OWNER_DISPLAY_NAME);
        let released = self
            .deps
            .project_locks
            .with_project_locked(
                project_id,
                ProjectStatus::Closing,
                owner,
                Notify::Emit,
                self.release_project(key, &other_dead, project_id),
            )
            .await;

        match released {
            Ok(result) => result,
            Err(LockError::Held(_)) => Ok(FieldOutcome::Busy),
            Err(e) => Err(e.into()),
        }
    }

    /// Stop the project's services and strip it from every dead holder.
    /// Runs under the project lock.
    async fn release_project(
        &self,
        key: &ResourceKey,
        other_dead: &[ResourceKey],
        project_id: ProjectId,
    ) -> Result<FieldOutcome, GcError> {
        let value = project_id.to_string();

        // A collector that held the lock before us may already have
        // released the project.
        let current = self.deps.registry.get_resources(key).await?;
        if current.get(fields::PROJECT_ID) != Some(&value) {
            return Ok(FieldOutcome::AlreadyReleased);
        }

        let services = self
            .deps
            .orchestrator
            .list_project_services(project_id)
            .await?;
        tracing::info!(
            %project_id,
            user_id = key.user_id,
            services = services.len(),
            "Closing project abandoned by its last session"
        );
        for service in services {
            self.stop_service(service.service_uuid, false).await;
        }

        self.strip(key, other_dead, fields::PROJECT_ID, &value).await?;
        Ok(FieldOutcome::Released)
    }

    /// Remove `field` from `key` and from the other holders that are still
    /// dead and still hold `value`, pruning those left empty.
    async fn strip(
        &self,
        key: &ResourceKey,
        other_dead: &[ResourceKey],
        field: &str,
        value: &str,
    ) -> Result<(), GcError> {
        self.deps.registry.remove_resource(key, field).await?;
        for other in other_dead {
            if self.deps.registry.is_alive(other).await? {
                continue;
            }
            let held = self.deps.registry.get_resources(other).await?;
            if held.get(field).map(String::as_str) != Some(value) {
                continue;
            }
            self.deps.registry.remove_resource(other, field).await?;
            self.deps.registry.prune_if_empty(other).await?;
        }
        Ok(())
    }
}
