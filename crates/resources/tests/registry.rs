//! Integration tests for `ResourceRegistry` and `SessionTracker` over the
//! in-process store.

use std::sync::Arc;
use std::time::Duration;

use keeper_core::resource::{fields, ResourceKey};
use keeper_resources::{MemoryStore, ResourceRegistry, SessionTracker, TrackerTtls};

const TTLS: TrackerTtls = TrackerTtls {
    heartbeat: Duration::from_secs(60),
    resource_deletion: Duration::from_secs(5),
};

fn tracker() -> SessionTracker {
    let registry = ResourceRegistry::new(Arc::new(MemoryStore::new()));
    SessionTracker::new(registry, TTLS)
}

// ---------------------------------------------------------------------------
// Test: connecting attaches the socket and marks the session alive
// ---------------------------------------------------------------------------

#[tokio::test]
async fn set_socket_id_attaches_resource_and_marks_alive() {
    let tracker = tracker();
    let session = tracker.session(7, "tabA");

    session.set_socket_id("sock-1").await.unwrap();

    assert_eq!(session.get_socket_id().await.unwrap().as_deref(), Some("sock-1"));
    assert!(session.is_alive().await.unwrap());
    assert_eq!(
        tracker
            .registry()
            .find_keys(fields::SOCKET_ID, "sock-1")
            .await
            .unwrap(),
        vec![ResourceKey::session(7, "tabA")]
    );
}

// ---------------------------------------------------------------------------
// Test: disconnect drops the socket and the key dies after the grace period
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn disconnected_session_dies_after_deletion_timeout() {
    let tracker = tracker();
    let session = tracker.session(7, "tabA");
    session.set_socket_id("sock-1").await.unwrap();
    session.add(fields::PROJECT_ID, "P1").await.unwrap();

    session.user_pressed_disconnect().await.unwrap();
    assert!(session.get_socket_id().await.unwrap().is_none());
    assert!(session.is_alive().await.unwrap());

    tokio::time::advance(TTLS.resource_deletion + Duration::from_secs(1)).await;

    let (alive, dead) = tracker.registry().get_all_keys().await.unwrap();
    assert!(alive.is_empty());
    assert_eq!(dead, vec![ResourceKey::session(7, "tabA")]);
}

// ---------------------------------------------------------------------------
// Test: heartbeats keep a session alive past the heartbeat TTL
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn heartbeat_extends_liveness() {
    let tracker = tracker();
    let session = tracker.session(1, "s");
    session.set_socket_id("sock").await.unwrap();

    for _ in 0..3 {
        tokio::time::advance(Duration::from_secs(50)).await;
        session.heartbeat().await.unwrap();
    }

    assert!(session.is_alive().await.unwrap());
}

// ---------------------------------------------------------------------------
// Test: aggregate lookups span every session of the user
// ---------------------------------------------------------------------------

#[tokio::test]
async fn find_socket_ids_spans_all_sessions_of_user() {
    let tracker = tracker();
    tracker.session(3, "a").set_socket_id("s-a").await.unwrap();
    tracker.session(3, "b").set_socket_id("s-b").await.unwrap();
    tracker.session(4, "c").set_socket_id("s-c").await.unwrap();

    let sockets = tracker.session(3, "a").find_socket_ids().await.unwrap();
    assert_eq!(sockets, vec!["s-a".to_string(), "s-b".to_string()]);
}

#[tokio::test]
async fn find_users_of_resource_deduplicates() {
    let tracker = tracker();
    tracker.session(3, "a").add(fields::PROJECT_ID, "P").await.unwrap();
    tracker.session(3, "b").add(fields::PROJECT_ID, "P").await.unwrap();
    tracker.session(9, "c").add(fields::PROJECT_ID, "P").await.unwrap();

    let users = tracker
        .find_users_of_resource(fields::PROJECT_ID, "P")
        .await
        .unwrap();
    assert_eq!(users, vec![3, 9]);
}

// ---------------------------------------------------------------------------
// Test: removals are idempotent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn removing_absent_field_or_key_is_noop() {
    let registry = ResourceRegistry::new(Arc::new(MemoryStore::new()));
    let key = ResourceKey::session(1, "x");

    registry.remove_resource(&key, fields::PROJECT_ID).await.unwrap();
    registry.remove_key(&key).await.unwrap();
    registry.remove_key(&key).await.unwrap();

    assert!(registry.get_resources(&key).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Test: prune only removes empty, dead keys
// ---------------------------------------------------------------------------

#[tokio::test]
async fn prune_if_empty_respects_fields_and_liveness() {
    let registry = ResourceRegistry::new(Arc::new(MemoryStore::new()));
    let key = ResourceKey::session(1, "x");

    registry.set_resource(&key, fields::PROJECT_ID, "P").await.unwrap();
    assert!(!registry.prune_if_empty(&key).await.unwrap());

    registry.remove_resource(&key, fields::PROJECT_ID).await.unwrap();
    registry
        .set_alive(&key, true, Duration::from_secs(30))
        .await
        .unwrap();
    assert!(!registry.prune_if_empty(&key).await.unwrap());

    registry
        .set_alive(&key, false, Duration::ZERO)
        .await
        .unwrap();
    assert!(registry.prune_if_empty(&key).await.unwrap());
    assert!(registry.find_user_keys(1).await.unwrap().is_empty());
}
