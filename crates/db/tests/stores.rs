//! Integration tests for the Postgres adapters.
//!
//! These need a reachable database (`DATABASE_URL`); run them with
//! `cargo test -p keeper-db -- --ignored`.

use std::collections::HashSet;
use std::time::Duration;

use keeper_core::access_rights::{AccessFlags, AccessRights};
use keeper_core::projects::ProjectStore;
use keeper_core::resource::{fields, ResourceKey};
use keeper_core::store::{LockStore, ResourceStore};
use keeper_core::users::UserStore;
use keeper_db::{PgLockStore, PgProjectStore, PgResourceStore, PgUserStore};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

const TTL: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Insert a user with its primary group. Returns `(user_id, primary_gid)`.
async fn seed_user(pool: &PgPool, name: &str, role: &str) -> (i64, i64) {
    let (gid,): (i64,) =
        sqlx::query_as("INSERT INTO groups (name, kind) VALUES ($1, 'PRIMARY') RETURNING gid")
            .bind(name)
            .fetch_one(pool)
            .await
            .unwrap();
    let (uid,): (i64,) = sqlx::query_as(
        "INSERT INTO users (name, primary_gid, role) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(name)
    .bind(gid)
    .bind(role)
    .fetch_one(pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO user_to_groups (uid, gid) VALUES ($1, $2)")
        .bind(uid)
        .bind(gid)
        .execute(pool)
        .await
        .unwrap();
    (uid, gid)
}

async fn seed_project(pool: &PgPool, owner: i64, rights: &AccessRights, node: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO projects (uuid, name, owner, workbench, access_rights)
         VALUES ($1, 'demo', $2, $3, $4)",
    )
    .bind(id)
    .bind(owner)
    .bind(serde_json::json!({ node.to_string(): { "key": "sleeper" } }))
    .bind(Json(rights))
    .execute(pool)
    .await
    .unwrap();
    id
}

// ---------------------------------------------------------------------------
// Test: lock leases
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn lock_is_exclusive_until_released(pool: PgPool) {
    let store = PgLockStore::new(pool);

    assert!(store.try_acquire("p", "t1", "{}", TTL).await.unwrap());
    assert!(!store.try_acquire("p", "t2", "{}", TTL).await.unwrap());
    assert!(store.extend("p", "t1", TTL).await.unwrap());
    assert!(!store.release("p", "t2").await.unwrap());

    assert!(store.release("p", "t1").await.unwrap());
    assert!(!store.is_locked("p").await.unwrap());
    assert!(store.try_acquire("p", "t2", "{}", TTL).await.unwrap());
}

// ---------------------------------------------------------------------------
// Test: key partitioning
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn keys_without_marker_are_dead(pool: PgPool) {
    let store = PgResourceStore::new(pool);
    let alive = ResourceKey::session(1, "a");
    let dead = ResourceKey::session(1, "b");

    store.set_resource(&alive, fields::PROJECT_ID, "P").await.unwrap();
    store.set_resource(&dead, fields::PROJECT_ID, "P").await.unwrap();
    store.set_alive(&alive, TTL).await.unwrap();

    let (alive_keys, dead_keys) = store.all_keys().await.unwrap();
    assert_eq!(alive_keys, vec![alive.clone()]);
    assert_eq!(dead_keys, vec![dead.clone()]);

    assert_eq!(
        store.find_keys(fields::PROJECT_ID, "P").await.unwrap(),
        vec![alive, dead.clone()]
    );

    store.remove_resource(&dead, fields::PROJECT_ID).await.unwrap();
    assert!(store.remove_key_if_empty(&dead).await.unwrap());
    assert_eq!(store.find_user_keys(1).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn expired_marker_without_fields_is_dead_until_pruned(pool: PgPool) {
    let store = PgResourceStore::new(pool);
    let key = ResourceKey::session(2, "gone");

    store.set_alive(&key, Duration::from_millis(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (alive, dead) = store.all_keys().await.unwrap();
    assert!(alive.is_empty());
    assert_eq!(dead, vec![key.clone()]);

    assert!(store.remove_key_if_empty(&key).await.unwrap());
    let (alive, dead) = store.all_keys().await.unwrap();
    assert!(alive.is_empty());
    assert!(dead.is_empty());
}

// ---------------------------------------------------------------------------
// Test: ownership transfer and user deletion
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn reassign_owner_moves_owner_entry(pool: PgPool) {
    let (guest, guest_gid) = seed_user(&pool, "guest-1", "GUEST").await;
    let (user, user_gid) = seed_user(&pool, "jane", "USER").await;
    let rights: AccessRights = [
        (guest_gid, AccessFlags::OWNER),
        (user_gid, AccessFlags::COLLABORATOR),
    ]
    .into_iter()
    .collect();
    let project = seed_project(&pool, guest, &rights, Uuid::new_v4()).await;

    let projects = PgProjectStore::new(pool.clone());
    assert!(projects.has_write_permission(user, project).await.unwrap());

    projects
        .reassign_owner(project, guest_gid, user_gid)
        .await
        .unwrap();

    let info = projects.get_project(project, user).await.unwrap();
    assert_eq!(info.owner, user);
    assert_eq!(info.access_rights.get(guest_gid), None);
    assert_eq!(info.access_rights.get(user_gid), Some(AccessFlags::OWNER));

    let users = PgUserStore::new(pool);
    users.delete_user(guest).await.unwrap();
    assert!(users.get_user(guest).await.unwrap_err().is_not_found());
    assert!(users.get_group(guest_gid).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn workbench_lookup_finds_nodes(pool: PgPool) {
    let (owner, gid) = seed_user(&pool, "owner", "USER").await;
    let node = Uuid::new_v4();
    let rights: AccessRights = [(gid, AccessFlags::OWNER)].into_iter().collect();
    let project = seed_project(&pool, owner, &rights, node).await;

    let projects = PgProjectStore::new(pool);
    assert!(projects.node_id_in_any_workbench(node).await.unwrap());
    assert!(!projects.node_id_in_any_workbench(Uuid::new_v4()).await.unwrap());
    assert_eq!(
        projects.get_workbench_node_ids(project).await.unwrap(),
        HashSet::from([node])
    );
    assert_eq!(projects.list_owned_project_ids(owner).await.unwrap(), vec![project]);
}
