//! Repositories for the `session_resources` and `session_liveness` tables.
//!
//! Liveness is always evaluated against `NOW()`, so every replica agrees on
//! which keys are alive regardless of local clock skew.

use keeper_core::types::UserId;
use sqlx::PgPool;

use crate::models::session::{SessionKeyRow, SessionResourceRow};

// ---------------------------------------------------------------------------
// SessionResourceRepo
// ---------------------------------------------------------------------------

/// Provides operations on the fields attached to session keys.
pub struct SessionResourceRepo;

impl SessionResourceRepo {
    /// Insert or overwrite one field of a key.
    pub async fn upsert(
        pool: &PgPool,
        user_id: UserId,
        client_session_id: &str,
        field: &str,
        value: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO session_resources (user_id, client_session_id, field, value)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id, client_session_id, field)
             DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
        )
        .bind(user_id)
        .bind(client_session_id)
        .bind(field)
        .bind(value)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Delete one field of a key. Returns `true` if a row was removed.
    pub async fn delete_field(
        pool: &PgPool,
        user_id: UserId,
        client_session_id: &str,
        field: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM session_resources
             WHERE user_id = $1 AND client_session_id = $2 AND field = $3",
        )
        .bind(user_id)
        .bind(client_session_id)
        .bind(field)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All fields of one key.
    pub async fn list_for_key(
        pool: &PgPool,
        user_id: UserId,
        client_session_id: &str,
    ) -> Result<Vec<SessionResourceRow>, sqlx::Error> {
        sqlx::query_as::<_, SessionResourceRow>(
            "SELECT field, value FROM session_resources
             WHERE user_id = $1 AND client_session_id = $2
             ORDER BY field",
        )
        .bind(user_id)
        .bind(client_session_id)
        .fetch_all(pool)
        .await
    }

    /// Values of `field` across the user's sessions, or one session when
    /// `client_session_id` is given.
    pub async fn list_values(
        pool: &PgPool,
        user_id: UserId,
        client_session_id: Option<&str>,
        field: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT value FROM session_resources
             WHERE user_id = $1
               AND ($2::text IS NULL OR client_session_id = $2)
               AND field = $3
             ORDER BY value",
        )
        .bind(user_id)
        .bind(client_session_id)
        .bind(field)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(v,)| v).collect())
    }

    /// Keys holding `field = value`.
    pub async fn find_keys(
        pool: &PgPool,
        field: &str,
        value: &str,
    ) -> Result<Vec<SessionKeyRow>, sqlx::Error> {
        sqlx::query_as::<_, SessionKeyRow>(
            "SELECT user_id, client_session_id FROM session_resources
             WHERE field = $1 AND value = $2
             ORDER BY user_id, client_session_id",
        )
        .bind(field)
        .bind(value)
        .fetch_all(pool)
        .await
    }

    /// Keys of a user that hold fields or a live marker.
    pub async fn list_user_keys(
        pool: &PgPool,
        user_id: UserId,
    ) -> Result<Vec<SessionKeyRow>, sqlx::Error> {
        sqlx::query_as::<_, SessionKeyRow>(
            "SELECT user_id, client_session_id FROM session_resources WHERE user_id = $1
             UNION
             SELECT user_id, client_session_id FROM session_liveness
             WHERE user_id = $1 AND expires_at > NOW()
             ORDER BY user_id, client_session_id",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Partition all keys into `(alive, dead)` within one transaction so
    /// both lists see the same `NOW()`.
    pub async fn partition_keys(
        pool: &PgPool,
    ) -> Result<(Vec<SessionKeyRow>, Vec<SessionKeyRow>), sqlx::Error> {
        let mut tx = pool.begin().await?;

        let alive = sqlx::query_as::<_, SessionKeyRow>(
            "SELECT user_id, client_session_id FROM session_liveness
             WHERE expires_at > NOW()
             ORDER BY user_id, client_session_id",
        )
        .fetch_all(&mut *tx)
        .await?;

        // Keys holding fields without a live marker, plus expired markers
        // of keys that hold nothing.
        let dead = sqlx::query_as::<_, SessionKeyRow>(
            "SELECT r.user_id, r.client_session_id
             FROM session_resources r
             LEFT JOIN session_liveness l
               ON l.user_id = r.user_id
              AND l.client_session_id = r.client_session_id
              AND l.expires_at > NOW()
             WHERE l.user_id IS NULL
             UNION
             SELECT l.user_id, l.client_session_id
             FROM session_liveness l
             WHERE l.expires_at <= NOW()
               AND NOT EXISTS (
                   SELECT 1 FROM session_resources r
                   WHERE r.user_id = l.user_id AND r.client_session_id = l.client_session_id
               )
             ORDER BY user_id, client_session_id",
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((alive, dead))
    }

    /// Drop every field and the liveness marker of a key.
    pub async fn delete_key(
        pool: &PgPool,
        user_id: UserId,
        client_session_id: &str,
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM session_resources WHERE user_id = $1 AND client_session_id = $2")
            .bind(user_id)
            .bind(client_session_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM session_liveness WHERE user_id = $1 AND client_session_id = $2")
            .bind(user_id)
            .bind(client_session_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }

    /// Delete a key only if it has no fields and no live marker.
    ///
    /// Returns `true` if the key no longer exists afterwards. The marker
    /// row is deleted only while expired, so a concurrent heartbeat wins.
    pub async fn delete_key_if_empty(
        pool: &PgPool,
        user_id: UserId,
        client_session_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let (busy,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (
                 SELECT 1 FROM session_resources
                 WHERE user_id = $1 AND client_session_id = $2
             ) OR EXISTS (
                 SELECT 1 FROM session_liveness
                 WHERE user_id = $1 AND client_session_id = $2 AND expires_at > NOW()
             )",
        )
        .bind(user_id)
        .bind(client_session_id)
        .fetch_one(&mut *tx)
        .await?;

        if busy {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "DELETE FROM session_liveness
             WHERE user_id = $1 AND client_session_id = $2 AND expires_at <= NOW()",
        )
        .bind(user_id)
        .bind(client_session_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// SessionLivenessRepo
// ---------------------------------------------------------------------------

/// Provides operations on the liveness markers of session keys.
pub struct SessionLivenessRepo;

impl SessionLivenessRepo {
    /// Set the marker to expire `ttl_secs` from now.
    pub async fn touch(
        pool: &PgPool,
        user_id: UserId,
        client_session_id: &str,
        ttl_secs: f64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO session_liveness (user_id, client_session_id, expires_at)
             VALUES ($1, $2, NOW() + make_interval(secs => $3))
             ON CONFLICT (user_id, client_session_id)
             DO UPDATE SET expires_at = EXCLUDED.expires_at",
        )
        .bind(user_id)
        .bind(client_session_id)
        .bind(ttl_secs)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(
        pool: &PgPool,
        user_id: UserId,
        client_session_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM session_liveness WHERE user_id = $1 AND client_session_id = $2")
            .bind(user_id)
            .bind(client_session_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn is_alive(
        pool: &PgPool,
        user_id: UserId,
        client_session_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let (alive,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (
                 SELECT 1 FROM session_liveness
                 WHERE user_id = $1 AND client_session_id = $2 AND expires_at > NOW()
             )",
        )
        .bind(user_id)
        .bind(client_session_id)
        .fetch_one(pool)
        .await?;
        Ok(alive)
    }
}
