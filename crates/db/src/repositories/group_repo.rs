//! Repository for the `groups` and `user_to_groups` tables.

use keeper_core::types::{GroupId, UserId};
use sqlx::PgPool;

use crate::models::user::GroupRow;

pub struct GroupRepo;

impl GroupRepo {
    pub async fn find_by_id(pool: &PgPool, gid: GroupId) -> Result<Option<GroupRow>, sqlx::Error> {
        sqlx::query_as::<_, GroupRow>("SELECT gid, name, kind FROM groups WHERE gid = $1")
            .bind(gid)
            .fetch_optional(pool)
            .await
    }

    /// Member user ids of a group, ordered by id.
    pub async fn list_member_ids(pool: &PgPool, gid: GroupId) -> Result<Vec<UserId>, sqlx::Error> {
        let rows: Vec<(UserId,)> =
            sqlx::query_as("SELECT uid FROM user_to_groups WHERE gid = $1 ORDER BY uid")
                .bind(gid)
                .fetch_all(pool)
                .await?;
        Ok(rows.into_iter().map(|(uid,)| uid).collect())
    }
}
