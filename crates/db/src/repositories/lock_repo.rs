//! Repository for the `distributed_locks` table.

use sqlx::PgPool;

use crate::models::lock::LockRow;

/// Column list for `distributed_locks` queries.
const COLUMNS: &str = "name, token, payload, acquired_at, expires_at";

/// Provides lease operations on named locks.
pub struct LockRepo;

impl LockRepo {
    /// Take the lock unless a live lease exists.
    ///
    /// Uses `INSERT ... ON CONFLICT DO UPDATE ... WHERE expires_at <= NOW()`
    /// so an expired lease is replaced atomically and a live one is left
    /// untouched. Returns `true` if the caller now holds the lease.
    pub async fn try_acquire(
        pool: &PgPool,
        name: &str,
        token: &str,
        payload: &str,
        ttl_secs: f64,
    ) -> Result<bool, sqlx::Error> {
        let row: Option<(String,)> = sqlx::query_as(
            "INSERT INTO distributed_locks (name, token, payload, expires_at)
             VALUES ($1, $2, $3, NOW() + make_interval(secs => $4))
             ON CONFLICT (name) DO UPDATE
             SET token = EXCLUDED.token,
                 payload = EXCLUDED.payload,
                 acquired_at = NOW(),
                 expires_at = EXCLUDED.expires_at
             WHERE distributed_locks.expires_at <= NOW()
             RETURNING name",
        )
        .bind(name)
        .bind(token)
        .bind(payload)
        .bind(ttl_secs)
        .fetch_optional(pool)
        .await?;
        Ok(row.is_some())
    }

    /// Push the expiry of a live lease held by `token`.
    pub async fn extend(
        pool: &PgPool,
        name: &str,
        token: &str,
        ttl_secs: f64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE distributed_locks SET expires_at = NOW() + make_interval(secs => $3)
             WHERE name = $1 AND token = $2 AND expires_at > NOW()",
        )
        .bind(name)
        .bind(token)
        .bind(ttl_secs)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete the lease if `token` holds it.
    pub async fn release(pool: &PgPool, name: &str, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM distributed_locks WHERE name = $1 AND token = $2")
            .bind(name)
            .bind(token)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The live lease on `name`, or `None` if unlocked or expired.
    pub async fn get_active(pool: &PgPool, name: &str) -> Result<Option<LockRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM distributed_locks WHERE name = $1 AND expires_at > NOW()"
        );
        sqlx::query_as::<_, LockRow>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }
}
