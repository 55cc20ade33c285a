//! Repository for the `users` table.

use keeper_core::types::{GroupId, UserId};
use sqlx::PgPool;

use crate::models::user::{UserNameRow, UserRow};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, name, primary_gid, role, created_at";

/// Provides the user queries used by session cleanup.
pub struct UserRepo;

impl UserRepo {
    pub async fn find_by_id(pool: &PgPool, id: UserId) -> Result<Option<UserRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// `(id, name)` of every user with `role`, ordered by id.
    pub async fn list_by_role(pool: &PgPool, role: &str) -> Result<Vec<UserNameRow>, sqlx::Error> {
        sqlx::query_as::<_, UserNameRow>("SELECT id, name FROM users WHERE role = $1 ORDER BY id")
            .bind(role)
            .fetch_all(pool)
            .await
    }

    pub async fn find_id_by_primary_gid(
        pool: &PgPool,
        gid: GroupId,
    ) -> Result<Option<UserId>, sqlx::Error> {
        let row: Option<(UserId,)> = sqlx::query_as("SELECT id FROM users WHERE primary_gid = $1")
            .bind(gid)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(|(id,)| id))
    }

    /// Delete a user and its primary group.
    ///
    /// Memberships cascade. Fails with a foreign-key violation while the
    /// user still owns projects. Returns `false` if the user did not exist.
    pub async fn delete(pool: &PgPool, id: UserId) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let row: Option<(GroupId,)> =
            sqlx::query_as("DELETE FROM users WHERE id = $1 RETURNING primary_gid")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((primary_gid,)) = row else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query("DELETE FROM groups WHERE gid = $1 AND kind = 'PRIMARY'")
            .bind(primary_gid)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}
