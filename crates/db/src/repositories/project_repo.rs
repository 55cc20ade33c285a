//! Repository for the `projects` table.
//!
//! Access rights are stored as a JSONB object keyed by group id; permission
//! checks join it against `user_to_groups`.

use keeper_core::access_rights::AccessRights;
use keeper_core::types::{GroupId, ProjectId, UserId};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::project::ProjectRow;

/// Column list for `projects` queries. The workbench is loaded separately.
const COLUMNS: &str = "uuid, name, owner, access_rights, created_at, updated_at";

/// Provides the project queries used by session cleanup.
pub struct ProjectRepo;

impl ProjectRepo {
    /// Load a project the user may read, or `None`.
    pub async fn find_readable(
        pool: &PgPool,
        project_id: ProjectId,
        user_id: UserId,
    ) -> Result<Option<ProjectRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM projects p
             WHERE p.uuid = $1
               AND (p.owner = $2 OR EXISTS (
                   SELECT 1 FROM user_to_groups ug
                   WHERE ug.uid = $2
                     AND COALESCE((p.access_rights -> ug.gid::text ->> 'read')::boolean, false)
               ))"
        );
        sqlx::query_as::<_, ProjectRow>(&query)
            .bind(project_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Keys of the project's workbench object (node ids as text).
    pub async fn list_workbench_node_ids(
        pool: &PgPool,
        project_id: ProjectId,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT jsonb_object_keys(workbench) FROM projects WHERE uuid = $1")
                .bind(project_id)
                .fetch_all(pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// `true` if any project's workbench has a node with this id.
    pub async fn node_in_any_workbench(pool: &PgPool, node_id: &str) -> Result<bool, sqlx::Error> {
        let (found,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM projects WHERE workbench ? $1)")
                .bind(node_id)
                .fetch_one(pool)
                .await?;
        Ok(found)
    }

    pub async fn list_owned_ids(
        pool: &PgPool,
        user_id: UserId,
    ) -> Result<Vec<ProjectId>, sqlx::Error> {
        let rows: Vec<(ProjectId,)> =
            sqlx::query_as("SELECT uuid FROM projects WHERE owner = $1 ORDER BY created_at, uuid")
                .bind(user_id)
                .fetch_all(pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// `true` if one of the user's groups has write access to the project.
    pub async fn has_write_access(
        pool: &PgPool,
        user_id: UserId,
        project_id: ProjectId,
    ) -> Result<bool, sqlx::Error> {
        let (allowed,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (
                 SELECT 1 FROM projects p
                 JOIN user_to_groups ug ON ug.uid = $1
                 WHERE p.uuid = $2
                   AND COALESCE((p.access_rights -> ug.gid::text ->> 'write')::boolean, false)
             )",
        )
        .bind(user_id)
        .bind(project_id)
        .fetch_one(pool)
        .await?;
        Ok(allowed)
    }

    /// Hand the project to the user whose primary group is `new_gid`.
    ///
    /// Runs in one transaction with the project row locked. Returns `false`
    /// if the project does not exist, `RowNotFound` if no user owns
    /// `new_gid`.
    pub async fn reassign_owner(
        pool: &PgPool,
        project_id: ProjectId,
        old_gid: GroupId,
        new_gid: GroupId,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let row: Option<(Json<AccessRights>,)> =
            sqlx::query_as("SELECT access_rights FROM projects WHERE uuid = $1 FOR UPDATE")
                .bind(project_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((Json(mut access_rights),)) = row else {
            tx.rollback().await?;
            return Ok(false);
        };

        let (new_owner,): (UserId,) = sqlx::query_as("SELECT id FROM users WHERE primary_gid = $1")
            .bind(new_gid)
            .fetch_one(&mut *tx)
            .await?;

        access_rights.transfer_ownership(old_gid, new_gid);

        sqlx::query(
            "UPDATE projects SET owner = $2, access_rights = $3, updated_at = NOW()
             WHERE uuid = $1",
        )
        .bind(project_id)
        .bind(new_owner)
        .bind(Json(&access_rights))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Delete a project. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, project_id: ProjectId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE uuid = $1")
            .bind(project_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
