//! Postgres adapters for the `keeper-core` store traits.
//!
//! Each adapter owns a pool handle and delegates to the repositories,
//! translating `sqlx::Error` into the error type of the trait it serves:
//! [`StoreError::Unavailable`] for the shared registry and lock stores,
//! [`DbError::Database`] for the relational stores.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use keeper_core::error::DbError;
use keeper_core::projects::{ProjectInfo, ProjectStore};
use keeper_core::resource::{ResourceKey, ResourceMap};
use keeper_core::roles::ROLE_GUEST;
use keeper_core::store::{LockStore, ResourceStore, StoreError};
use keeper_core::types::{GroupId, NodeId, ProjectId, UserId};
use keeper_core::users::{GroupInfo, UserInfo, UserStore};
use sqlx::PgPool;

use crate::repositories::{
    GroupRepo, LockRepo, ProjectRepo, SessionLivenessRepo, SessionResourceRepo, UserRepo,
};

fn unavailable(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn database(err: sqlx::Error) -> DbError {
    DbError::Database(err.to_string())
}

/// The client session id of a concrete key.
fn session_id(key: &ResourceKey) -> Result<&str, StoreError> {
    key.client_session_id
        .as_deref()
        .ok_or_else(|| StoreError::InvalidKey(key.clone()))
}

// ---------------------------------------------------------------------------
// PgResourceStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgResourceStore {
    pool: PgPool,
}

impl PgResourceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceStore for PgResourceStore {
    async fn set_resource(
        &self,
        key: &ResourceKey,
        field: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        SessionResourceRepo::upsert(&self.pool, key.user_id, session_id(key)?, field, value)
            .await
            .map_err(unavailable)
    }

    async fn remove_resource(&self, key: &ResourceKey, field: &str) -> Result<(), StoreError> {
        SessionResourceRepo::delete_field(&self.pool, key.user_id, session_id(key)?, field)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn get_resources(&self, key: &ResourceKey) -> Result<ResourceMap, StoreError> {
        let rows = SessionResourceRepo::list_for_key(&self.pool, key.user_id, session_id(key)?)
            .await
            .map_err(unavailable)?;
        Ok(rows.into_iter().map(|r| (r.field, r.value)).collect())
    }

    async fn find_resources(
        &self,
        key: &ResourceKey,
        field: &str,
    ) -> Result<Vec<String>, StoreError> {
        SessionResourceRepo::list_values(
            &self.pool,
            key.user_id,
            key.client_session_id.as_deref(),
            field,
        )
        .await
        .map_err(unavailable)
    }

    async fn find_keys(&self, field: &str, value: &str) -> Result<Vec<ResourceKey>, StoreError> {
        let rows = SessionResourceRepo::find_keys(&self.pool, field, value)
            .await
            .map_err(unavailable)?;
        Ok(rows.into_iter().map(ResourceKey::from).collect())
    }

    async fn find_user_keys(&self, user_id: UserId) -> Result<Vec<ResourceKey>, StoreError> {
        let rows = SessionResourceRepo::list_user_keys(&self.pool, user_id)
            .await
            .map_err(unavailable)?;
        Ok(rows.into_iter().map(ResourceKey::from).collect())
    }

    async fn set_alive(&self, key: &ResourceKey, ttl: Duration) -> Result<(), StoreError> {
        SessionLivenessRepo::touch(&self.pool, key.user_id, session_id(key)?, ttl.as_secs_f64())
            .await
            .map_err(unavailable)
    }

    async fn clear_alive(&self, key: &ResourceKey) -> Result<(), StoreError> {
        SessionLivenessRepo::delete(&self.pool, key.user_id, session_id(key)?)
            .await
            .map_err(unavailable)
    }

    async fn is_alive(&self, key: &ResourceKey) -> Result<bool, StoreError> {
        SessionLivenessRepo::is_alive(&self.pool, key.user_id, session_id(key)?)
            .await
            .map_err(unavailable)
    }

    async fn all_keys(&self) -> Result<(Vec<ResourceKey>, Vec<ResourceKey>), StoreError> {
        let (alive, dead) = SessionResourceRepo::partition_keys(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok((
            alive.into_iter().map(ResourceKey::from).collect(),
            dead.into_iter().map(ResourceKey::from).collect(),
        ))
    }

    async fn remove_key(&self, key: &ResourceKey) -> Result<(), StoreError> {
        SessionResourceRepo::delete_key(&self.pool, key.user_id, session_id(key)?)
            .await
            .map_err(unavailable)
    }

    async fn remove_key_if_empty(&self, key: &ResourceKey) -> Result<bool, StoreError> {
        SessionResourceRepo::delete_key_if_empty(&self.pool, key.user_id, session_id(key)?)
            .await
            .map_err(unavailable)
    }
}

// ---------------------------------------------------------------------------
// PgLockStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgLockStore {
    pool: PgPool,
}

impl PgLockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockStore for PgLockStore {
    async fn try_acquire(
        &self,
        name: &str,
        token: &str,
        payload: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        LockRepo::try_acquire(&self.pool, name, token, payload, ttl.as_secs_f64())
            .await
            .map_err(unavailable)
    }

    async fn extend(&self, name: &str, token: &str, ttl: Duration) -> Result<bool, StoreError> {
        LockRepo::extend(&self.pool, name, token, ttl.as_secs_f64())
            .await
            .map_err(unavailable)
    }

    async fn release(&self, name: &str, token: &str) -> Result<bool, StoreError> {
        LockRepo::release(&self.pool, name, token)
            .await
            .map_err(unavailable)
    }

    async fn get_payload(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(LockRepo::get_active(&self.pool, name)
            .await
            .map_err(unavailable)?
            .map(|lock| lock.payload))
    }
}

// ---------------------------------------------------------------------------
// PgProjectStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgProjectStore {
    pool: PgPool,
}

impl PgProjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectStore for PgProjectStore {
    async fn get_workbench_node_ids(
        &self,
        project_id: ProjectId,
    ) -> Result<HashSet<NodeId>, DbError> {
        let ids = ProjectRepo::list_workbench_node_ids(&self.pool, project_id)
            .await
            .map_err(database)?;
        Ok(ids
            .into_iter()
            .filter_map(|id| match NodeId::parse_str(&id) {
                Ok(node_id) => Some(node_id),
                Err(_) => {
                    tracing::warn!(
                        %project_id,
                        node_id = %id,
                        "Skipping malformed workbench node id"
                    );
                    None
                }
            })
            .collect())
    }

    async fn node_id_in_any_workbench(&self, node_id: NodeId) -> Result<bool, DbError> {
        ProjectRepo::node_in_any_workbench(&self.pool, &node_id.to_string())
            .await
            .map_err(database)
    }

    async fn get_project(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> Result<ProjectInfo, DbError> {
        ProjectRepo::find_readable(&self.pool, project_id, user_id)
            .await
            .map_err(database)?
            .map(ProjectInfo::from)
            .ok_or_else(|| DbError::not_found("project", project_id))
    }

    async fn list_owned_project_ids(&self, user_id: UserId) -> Result<Vec<ProjectId>, DbError> {
        ProjectRepo::list_owned_ids(&self.pool, user_id)
            .await
            .map_err(database)
    }

    async fn has_write_permission(
        &self,
        user_id: UserId,
        project_id: ProjectId,
    ) -> Result<bool, DbError> {
        ProjectRepo::has_write_access(&self.pool, user_id, project_id)
            .await
            .map_err(database)
    }

    async fn reassign_owner(
        &self,
        project_id: ProjectId,
        old_gid: GroupId,
        new_gid: GroupId,
    ) -> Result<(), DbError> {
        match ProjectRepo::reassign_owner(&self.pool, project_id, old_gid, new_gid).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(DbError::not_found("project", project_id)),
            Err(sqlx::Error::RowNotFound) => {
                Err(DbError::not_found("user with primary group", new_gid))
            }
            Err(e) => Err(database(e)),
        }
    }

    async fn delete_project(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> Result<(), DbError> {
        let deleted = ProjectRepo::delete(&self.pool, project_id)
            .await
            .map_err(database)?;
        if deleted {
            tracing::info!(%project_id, user_id, "Project deleted");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PgUserStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get_user(&self, user_id: UserId) -> Result<UserInfo, DbError> {
        let row = UserRepo::find_by_id(&self.pool, user_id)
            .await
            .map_err(database)?
            .ok_or_else(|| DbError::not_found("user", user_id))?;
        UserInfo::try_from(row).map_err(|e| DbError::Database(e.to_string()))
    }

    async fn list_guest_user_ids(&self) -> Result<Vec<(UserId, String)>, DbError> {
        let rows = UserRepo::list_by_role(&self.pool, ROLE_GUEST)
            .await
            .map_err(database)?;
        Ok(rows.into_iter().map(|r| (r.id, r.name)).collect())
    }

    async fn delete_user(&self, user_id: UserId) -> Result<(), DbError> {
        let deleted = UserRepo::delete(&self.pool, user_id)
            .await
            .map_err(database)?;
        if deleted {
            tracing::info!(user_id, "User deleted");
        }
        Ok(())
    }

    async fn get_group(&self, gid: GroupId) -> Result<Option<GroupInfo>, DbError> {
        GroupRepo::find_by_id(&self.pool, gid)
            .await
            .map_err(database)?
            .map(GroupInfo::try_from)
            .transpose()
            .map_err(|e| DbError::Database(e.to_string()))
    }

    async fn list_group_member_ids(&self, gid: GroupId) -> Result<Vec<UserId>, DbError> {
        GroupRepo::list_member_ids(&self.pool, gid)
            .await
            .map_err(database)
    }

    async fn get_user_id_by_primary_gid(&self, gid: GroupId) -> Result<Option<UserId>, DbError> {
        UserRepo::find_id_by_primary_gid(&self.pool, gid)
            .await
            .map_err(database)
    }
}
