//! Session registry rows (`session_resources`, `session_liveness`).

use keeper_core::resource::ResourceKey;
use keeper_core::types::UserId;
use sqlx::FromRow;

/// A `(user_id, client_session_id)` pair selected from either table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SessionKeyRow {
    pub user_id: UserId,
    pub client_session_id: String,
}

impl From<SessionKeyRow> for ResourceKey {
    fn from(row: SessionKeyRow) -> Self {
        ResourceKey::session(row.user_id, row.client_session_id)
    }
}

/// A row from the `session_resources` table.
#[derive(Debug, Clone, FromRow)]
pub struct SessionResourceRow {
    pub field: String,
    pub value: String,
}
