//! User and group store interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DbError;
use crate::roles::UserRole;
use crate::types::{GroupId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: UserId,
    pub name: String,
    pub primary_gid: GroupId,
    pub role: UserRole,
}

/// Kind of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupKind {
    /// The personal group of exactly one user.
    Primary,
    /// A group users are invited into.
    Standard,
    /// The group every user belongs to.
    Everyone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub gid: GroupId,
    pub kind: GroupKind,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: UserId) -> Result<UserInfo, DbError>;

    async fn get_user_primary_gid(&self, user_id: UserId) -> Result<GroupId, DbError> {
        Ok(self.get_user(user_id).await?.primary_gid)
    }

    async fn get_user_role(&self, user_id: UserId) -> Result<UserRole, DbError> {
        Ok(self.get_user(user_id).await?.role)
    }

    async fn is_guest(&self, user_id: UserId) -> Result<bool, DbError> {
        Ok(self.get_user_role(user_id).await? == UserRole::Guest)
    }

    /// `(id, name)` of every user with the GUEST role.
    async fn list_guest_user_ids(&self) -> Result<Vec<(UserId, String)>, DbError>;

    /// Delete a user row. Deleting an absent user is a no-op.
    async fn delete_user(&self, user_id: UserId) -> Result<(), DbError>;

    /// `None` if the group does not exist.
    async fn get_group(&self, gid: GroupId) -> Result<Option<GroupInfo>, DbError>;

    /// Members of a group, ordered by user id.
    async fn list_group_member_ids(&self, gid: GroupId) -> Result<Vec<UserId>, DbError>;

    /// Owner of a primary group, `None` if no such user exists.
    async fn get_user_id_by_primary_gid(&self, gid: GroupId) -> Result<Option<UserId>, DbError>;
}
