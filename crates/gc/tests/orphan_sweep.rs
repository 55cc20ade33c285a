//! Integration tests for the sweep of services no open project accounts for.

mod common;

use std::sync::atomic::Ordering;

use common::{rights, Harness};
use keeper_core::orchestrator::ServiceState;
use keeper_core::roles::UserRole;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Test: nodes that no longer exist
// ---------------------------------------------------------------------------

#[tokio::test]
async fn service_of_deleted_node_is_stopped_without_saving() {
    let h = Harness::new();
    let other = h.projects.add(6, rights(60, &[]), &[]);
    h.alive_key(6, "tab", other).await;
    // The service points at a project that no longer lists its node.
    let node = h.orchestrator.add(Uuid::new_v4(), 6, ServiceState::Running);

    let report = h.gc.collect_garbage().await.unwrap();

    assert_eq!(h.orchestrator.stops(), vec![(node, false)]);
    assert_eq!(report.services_stopped, 1);
}

#[tokio::test]
async fn service_of_deleted_node_is_stopped_even_while_starting() {
    let h = Harness::new();
    let node = h.orchestrator.add(Uuid::new_v4(), 6, ServiceState::Pulling);

    h.gc.collect_garbage().await.unwrap();

    assert_eq!(h.orchestrator.stops(), vec![(node, false)]);
}

// ---------------------------------------------------------------------------
// Test: save-state rules for closed projects
// ---------------------------------------------------------------------------

#[tokio::test]
async fn writer_service_is_stopped_with_state_saved() {
    let h = Harness::new();
    h.users.add_user(6, UserRole::User);
    let project = h.projects.add(6, rights(60, &[]), &[]);
    let node = h.orchestrator.add(project, 6, ServiceState::Running);
    h.projects.add_node(project, node);
    h.projects.grant_write(6, project);

    h.gc.collect_garbage().await.unwrap();

    assert_eq!(h.orchestrator.stops(), vec![(node, true)]);
}

#[tokio::test]
async fn guest_service_is_stopped_without_saving() {
    let h = Harness::new();
    let gid = h.users.add_user(5, UserRole::Guest);
    let project = h.projects.add(6, rights(60, &[gid]), &[]);
    let node = h.orchestrator.add(project, 5, ServiceState::Running);
    h.projects.add_node(project, node);
    h.projects.grant_write(5, project);
    // Keep the guest account out of the guest sweep.
    let _construction = h
        .project_locks
        .lock_manager()
        .lock_guest_user(5, common::LONG_TTL)
        .await
        .unwrap();

    h.gc.collect_garbage().await.unwrap();

    assert_eq!(h.orchestrator.stops(), vec![(node, false)]);
}

#[tokio::test]
async fn service_of_user_without_write_access_is_stopped_without_saving() {
    let h = Harness::new();
    h.users.add_user(6, UserRole::User);
    let project = h.projects.add(7, rights(70, &[]), &[]);
    let node = h.orchestrator.add(project, 6, ServiceState::Running);
    h.projects.add_node(project, node);

    h.gc.collect_garbage().await.unwrap();

    assert_eq!(h.orchestrator.stops(), vec![(node, false)]);
}

#[tokio::test]
async fn service_of_unknown_user_is_stopped_without_saving() {
    let h = Harness::new();
    let project = h.projects.add(7, rights(70, &[]), &[]);
    let node = h.orchestrator.add(project, 0, ServiceState::Running);
    h.projects.add_node(project, node);

    h.gc.collect_garbage().await.unwrap();

    assert_eq!(h.orchestrator.stops(), vec![(node, false)]);
}

// ---------------------------------------------------------------------------
// Test: services left running
// ---------------------------------------------------------------------------

#[tokio::test]
async fn starting_services_are_left_alone() {
    let h = Harness::new();
    let project = h.projects.add(6, rights(60, &[]), &[]);
    let pulling = h.orchestrator.add(project, 6, ServiceState::Pulling);
    let starting = h.orchestrator.add(project, 6, ServiceState::Starting);
    h.projects.add_node(project, pulling);
    h.projects.add_node(project, starting);

    let report = h.gc.collect_garbage().await.unwrap();

    assert!(h.orchestrator.stops().is_empty());
    assert_eq!(report.services_stopped, 0);
}

#[tokio::test]
async fn services_of_open_projects_are_left_alone() {
    let h = Harness::new();
    let project = h.projects.add(6, rights(60, &[]), &[]);
    let node = h.orchestrator.add(project, 6, ServiceState::Running);
    h.projects.add_node(project, node);
    h.alive_key(9, "viewer-tab", project).await;

    h.gc.collect_garbage().await.unwrap();

    assert!(h.orchestrator.stops().is_empty());
    assert!(h.orchestrator.is_running(node));
}

// ---------------------------------------------------------------------------
// Test: orchestrator failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn listing_failure_skips_the_sweep() {
    let h = Harness::new();
    let project = h.projects.add(6, rights(60, &[]), &[]);
    let node = h.orchestrator.add(project, 6, ServiceState::Running);
    h.projects.add_node(project, node);
    h.orchestrator.fail_listing.store(true, Ordering::SeqCst);

    let report = h.gc.collect_garbage().await.unwrap();

    assert!(report.is_empty());
    assert!(h.orchestrator.stops().is_empty());
}

#[tokio::test]
async fn refused_stop_is_not_counted() {
    let h = Harness::new();
    let project = h.projects.add(6, rights(60, &[]), &[]);
    let node = h.orchestrator.add(project, 6, ServiceState::Running);
    h.projects.add_node(project, node);
    h.orchestrator.refuse(node);

    let report = h.gc.collect_garbage().await.unwrap();

    assert_eq!(h.orchestrator.stops(), vec![(node, false)]);
    assert!(h.orchestrator.is_running(node));
    assert_eq!(report.services_stopped, 0);
}

#[tokio::test]
async fn refused_stop_does_not_block_other_services() {
    let h = Harness::new();
    let project = h.projects.add(6, rights(60, &[]), &[]);
    let refused = h.orchestrator.add(project, 6, ServiceState::Running);
    let stopped = h.orchestrator.add(project, 6, ServiceState::Running);
    h.projects.add_node(project, refused);
    h.projects.add_node(project, stopped);
    h.orchestrator.refuse(refused);

    let report = h.gc.collect_garbage().await.unwrap();

    let mut stops = h.orchestrator.stops();
    stops.sort();
    let mut expected = vec![(refused, false), (stopped, false)];
    expected.sort();
    assert_eq!(stops, expected);
    assert_eq!(report.services_stopped, 1);
    assert!(h.orchestrator.is_running(refused));
    assert!(!h.orchestrator.is_running(stopped));
}
