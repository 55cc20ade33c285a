/// All relational primary keys (users, groups) are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier of a user row.
pub type UserId = DbId;

/// Identifier of a group row. Every user owns exactly one primary group.
pub type GroupId = DbId;

/// Projects are addressed by UUID.
pub type ProjectId = uuid::Uuid;

/// Workbench nodes are addressed by UUID. A dynamic service runs under the
/// id of the node it belongs to.
pub type NodeId = uuid::Uuid;
