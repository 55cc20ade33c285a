//! Project store interface.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::access_rights::AccessRights;
use crate::error::DbError;
use crate::types::{GroupId, NodeId, ProjectId, UserId};

/// The parts of a project the garbage collector reasons about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub uuid: ProjectId,
    pub owner: UserId,
    pub access_rights: AccessRights,
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Node ids of the project's workbench. Unknown projects yield an empty set.
    async fn get_workbench_node_ids(&self, project_id: ProjectId)
        -> Result<HashSet<NodeId>, DbError>;

    /// `true` if any project's workbench contains `node_id`.
    async fn node_id_in_any_workbench(&self, node_id: NodeId) -> Result<bool, DbError>;

    /// Load a project on behalf of `user_id`.
    async fn get_project(&self, project_id: ProjectId, user_id: UserId)
        -> Result<ProjectInfo, DbError>;

    /// Projects whose owner is `user_id`.
    async fn list_owned_project_ids(&self, user_id: UserId) -> Result<Vec<ProjectId>, DbError>;

    /// `true` if `user_id` may write to the project through any of its groups.
    async fn has_write_permission(
        &self,
        user_id: UserId,
        project_id: ProjectId,
    ) -> Result<bool, DbError>;

    /// Make the user behind primary group `new_gid` the owner: the old
    /// owner's access entry is removed and the new one receives the owner
    /// preset.
    async fn reassign_owner(
        &self,
        project_id: ProjectId,
        old_gid: GroupId,
        new_gid: GroupId,
    ) -> Result<(), DbError>;

    /// Delete the project record. An absent project is not an error.
    ///
    /// Running services must be stopped beforehand; stored outputs are not
    /// touched.
    async fn delete_project(&self, project_id: ProjectId, user_id: UserId) -> Result<(), DbError>;
}
