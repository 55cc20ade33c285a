//! Sweep 2 and guest account removal.
//!
//! A guest is deleted only when no session key, alive or dead, references
//! it and its construction lock is free. Its projects are deleted when
//! nobody else can write to them, otherwise handed to a collaborator.

use std::collections::HashSet;

use keeper_core::resource::ResourceKey;
use keeper_core::types::{GroupId, ProjectId, UserId};
use keeper_core::users::{GroupKind, UserInfo};

use crate::collector::{GarbageCollector, GcReport};
use crate::error::GcError;

impl GarbageCollector {
    pub(crate) async fn sweep_guest_users(&self) -> Result<GcReport, GcError> {
        let guests = self.deps.users.list_guest_user_ids().await?;
        if guests.is_empty() {
            return Ok(GcReport::default());
        }

        let (alive, dead) = self.deps.registry.get_all_keys().await?;
        let referenced: HashSet<UserId> = alive.iter().chain(&dead).map(|k| k.user_id).collect();
        let candidates: Vec<(UserId, String)> = guests
            .into_iter()
            .filter(|(id, _)| !referenced.contains(id))
            .collect();

        Ok(self
            .fan_out(candidates, |(user_id, name)| async move {
                match self
                    .deps
                    .project_locks
                    .lock_manager()
                    .is_guest_user_locked(user_id, Some(&name))
                    .await
                {
                    Ok(false) => {}
                    Ok(true) => {
                        tracing::debug!(user_id, "Guest is under construction, skipping");
                        return GcReport::default();
                    }
                    Err(e) => {
                        tracing::warn!(user_id, error = %e, "Failed to check guest lock");
                        return GcReport::default();
                    }
                }
                self.try_remove_guest(user_id).await
            })
            .await)
    }

    /// After pruning `key`: remove its user if it was a guest and has no
    /// key left. Returns `true` if the guest was deleted.
    pub(crate) async fn remove_guest_if_unreferenced(&self, key: &ResourceKey) -> bool {
        let user_id = key.user_id;
        let eligible = async {
            if !self.deps.registry.find_user_keys(user_id).await?.is_empty() {
                return Ok::<_, GcError>(false);
            }
            if !self.is_guest_cached(user_id).await? {
                return Ok(false);
            }
            let name = self.deps.users.get_user(user_id).await?.name;
            let locked = self
                .deps
                .project_locks
                .lock_manager()
                .is_guest_user_locked(user_id, Some(&name))
                .await?;
            Ok(!locked)
        };

        match eligible.await {
            Ok(true) => self.try_remove_guest(user_id).await.guests_removed > 0,
            Ok(false) => false,
            Err(GcError::Db(e)) if e.is_not_found() => false,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Failed to check guest for removal");
                false
            }
        }
    }

    async fn try_remove_guest(&self, user_id: UserId) -> GcReport {
        match self.remove_guest_user_with_all_its_resources(user_id).await {
            Ok(true) => GcReport {
                guests_removed: 1,
                ..GcReport::default()
            },
            Ok(false) => GcReport::default(),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Failed to remove guest user, will retry");
                GcReport::default()
            }
        }
    }

    /// Delete a guest account after deleting or handing over its projects.
    ///
    /// Accounts above the guest role are never touched. Any database error
    /// aborts the removal and leaves the user for the next cycle. Returns
    /// `true` if the user was deleted.
    pub async fn remove_guest_user_with_all_its_resources(
        &self,
        user_id: UserId,
    ) -> Result<bool, GcError> {
        let user = match self.deps.users.get_user(user_id).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if !user.role.is_disposable() {
            tracing::debug!(user_id, role = %user.role, "Not a guest, keeping user");
            return Ok(false);
        }

        for project_id in self.deps.projects.list_owned_project_ids(user_id).await? {
            self.resolve_owned_project(&user, project_id).await?;
        }

        self.deps.users.delete_user(user_id).await?;
        self.guest_roles.invalidate(&user_id).await;
        tracing::info!(user_id, name = %user.name, "Guest user removed");
        Ok(true)
    }

    /// Delete a project of a departing owner, or hand it to a collaborator.
    async fn resolve_owned_project(
        &self,
        owner: &UserInfo,
        project_id: ProjectId,
    ) -> Result<(), GcError> {
        let project = match self.deps.projects.get_project(project_id, owner.id).await {
            Ok(project) => project,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let writers = project.access_rights.writers_except(owner.primary_gid);
        if writers.is_empty() {
            tracing::info!(%project_id, user_id = owner.id, "Deleting project of removed guest");
            self.deps.projects.delete_project(project_id, owner.id).await?;
            return Ok(());
        }

        match self.find_successor(&writers, owner.id).await? {
            Some(new_gid) => {
                tracing::info!(
                    %project_id,
                    old_gid = owner.primary_gid,
                    new_gid,
                    "Transferring project ownership"
                );
                self.deps
                    .projects
                    .reassign_owner(project_id, owner.primary_gid, new_gid)
                    .await?;
            }
            None => {
                tracing::warn!(
                    %project_id,
                    user_id = owner.id,
                    "No successor among collaborators, leaving project in place"
                );
            }
        }
        Ok(())
    }

    /// Primary gid of the user inheriting a project.
    ///
    /// Collaborators' primary groups come first; otherwise the first
    /// existing member (by id) of a standard group with write access.
    async fn find_successor(
        &self,
        writers: &[GroupId],
        departing: UserId,
    ) -> Result<Option<GroupId>, GcError> {
        let mut standard = Vec::new();
        for &gid in writers {
            let Some(group) = self.deps.users.get_group(gid).await? else {
                continue;
            };
            match group.kind {
                GroupKind::Primary => {
                    if let Some(user_id) = self.deps.users.get_user_id_by_primary_gid(gid).await? {
                        if user_id != departing {
                            return Ok(Some(gid));
                        }
                    }
                }
                GroupKind::Standard => standard.push(gid),
                GroupKind::Everyone => {}
            }
        }

        for gid in standard {
            for member in self.deps.users.list_group_member_ids(gid).await? {
                if member == departing {
                    continue;
                }
                match self.deps.users.get_user_primary_gid(member).await {
                    Ok(primary_gid) => return Ok(Some(primary_gid)),
                    Err(e) if e.is_not_found() => continue,
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(None)
    }
}
