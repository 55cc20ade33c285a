//! Distributed lock rows.

use keeper_core::types::Timestamp;
use sqlx::FromRow;

/// A row from the `distributed_locks` table.
#[derive(Debug, Clone, FromRow)]
pub struct LockRow {
    pub name: String,
    pub token: String,
    pub payload: String,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
}
