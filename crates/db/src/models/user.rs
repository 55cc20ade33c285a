//! User and group rows.

use keeper_core::error::CoreError;
use keeper_core::roles::UserRole;
use keeper_core::types::{GroupId, Timestamp, UserId};
use keeper_core::users::{GroupInfo, GroupKind, UserInfo};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: UserId,
    pub name: String,
    pub primary_gid: GroupId,
    pub role: String,
    pub created_at: Timestamp,
}

impl TryFrom<UserRow> for UserInfo {
    type Error = CoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(UserInfo {
            id: row.id,
            name: row.name,
            primary_gid: row.primary_gid,
            role: row.role.parse()?,
        })
    }
}

/// `(id, name)` projection used when listing accounts.
#[derive(Debug, Clone, FromRow)]
pub struct UserNameRow {
    pub id: UserId,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

pub const GROUP_KIND_PRIMARY: &str = "PRIMARY";
pub const GROUP_KIND_STANDARD: &str = "STANDARD";
pub const GROUP_KIND_EVERYONE: &str = "EVERYONE";

/// A row from the `groups` table.
#[derive(Debug, Clone, FromRow)]
pub struct GroupRow {
    pub gid: GroupId,
    pub name: String,
    pub kind: String,
}

pub fn parse_group_kind(kind: &str) -> Result<GroupKind, CoreError> {
    match kind {
        GROUP_KIND_PRIMARY => Ok(GroupKind::Primary),
        GROUP_KIND_STANDARD => Ok(GroupKind::Standard),
        GROUP_KIND_EVERYONE => Ok(GroupKind::Everyone),
        other => Err(CoreError::Validation(format!("Unknown group kind: {other}"))),
    }
}

impl TryFrom<GroupRow> for GroupInfo {
    type Error = CoreError;

    fn try_from(row: GroupRow) -> Result<Self, Self::Error> {
        Ok(GroupInfo {
            gid: row.gid,
            kind: parse_group_kind(&row.kind)?,
        })
    }
}
