//! Project rows.

use keeper_core::access_rights::AccessRights;
use keeper_core::projects::ProjectInfo;
use keeper_core::types::{ProjectId, Timestamp, UserId};
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `projects` table, without the workbench document.
#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    pub uuid: ProjectId,
    pub name: String,
    pub owner: UserId,
    pub access_rights: Json<AccessRights>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<ProjectRow> for ProjectInfo {
    fn from(row: ProjectRow) -> Self {
        ProjectInfo {
            uuid: row.uuid,
            owner: row.owner,
            access_rights: row.access_rights.0,
        }
    }
}
