//! Shared fixtures for the collector integration tests: in-memory fakes of
//! the orchestrator, project and user stores, and a harness wiring them to
//! a `MemoryStore`-backed registry.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use keeper_core::access_rights::{AccessFlags, AccessRights};
use keeper_core::error::DbError;
use keeper_core::notify::Notifier;
use keeper_core::orchestrator::{Orchestrator, OrchestratorError, RunningService, ServiceState};
use keeper_core::project_lock::ProjectLock;
use keeper_core::projects::{ProjectInfo, ProjectStore};
use keeper_core::resource::{fields, ResourceKey};
use keeper_core::roles::UserRole;
use keeper_core::types::{GroupId, NodeId, ProjectId, UserId};
use keeper_core::users::{GroupInfo, GroupKind, UserInfo, UserStore};
use keeper_gc::{GarbageCollector, GcConfig, GcDeps};
use keeper_resources::{LockManager, MemoryStore, ProjectLockFacade, ResourceRegistry};
use uuid::Uuid;

pub const LONG_TTL: Duration = Duration::from_secs(3600);

// ---------------------------------------------------------------------------
// FakeOrchestrator
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeOrchestrator {
    services: Mutex<BTreeMap<NodeId, RunningService>>,
    /// Services whose stop is refused.
    refused: Mutex<HashSet<NodeId>>,
    /// Every stop request as `(service, save_state)`.
    stops: Mutex<Vec<(NodeId, bool)>>,
    /// Projects whose service listing fails.
    unlistable: Mutex<HashSet<ProjectId>>,
    pub fail_listing: AtomicBool,
}

impl FakeOrchestrator {
    pub fn add(&self, project_id: ProjectId, user_id: UserId, state: ServiceState) -> NodeId {
        let node = Uuid::new_v4();
        self.services.lock().unwrap().insert(
            node,
            RunningService {
                service_uuid: node,
                service_host: format!("dy-sidecar-{node}"),
                service_state: state,
                user_id: Some(user_id),
                project_id,
            },
        );
        node
    }

    pub fn refuse(&self, node: NodeId) {
        self.refused.lock().unwrap().insert(node);
    }

    pub fn fail_listing_for(&self, project_id: ProjectId) {
        self.unlistable.lock().unwrap().insert(project_id);
    }

    pub fn stops(&self) -> Vec<(NodeId, bool)> {
        self.stops.lock().unwrap().clone()
    }

    pub fn is_running(&self, node: NodeId) -> bool {
        self.services.lock().unwrap().contains_key(&node)
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn list_running_services(&self) -> Result<Vec<RunningService>, OrchestratorError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Unavailable("director down".into()));
        }
        Ok(self.services.lock().unwrap().values().cloned().collect())
    }

    async fn list_project_services(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<RunningService>, OrchestratorError> {
        if self.unlistable.lock().unwrap().contains(&project_id) {
            return Err(OrchestratorError::Unavailable("project listing failed".into()));
        }
        Ok(self
            .list_running_services()
            .await?
            .into_iter()
            .filter(|s| s.project_id == project_id)
            .collect())
    }

    async fn stop_service(
        &self,
        service_uuid: NodeId,
        save_state: bool,
    ) -> Result<(), OrchestratorError> {
        self.stops.lock().unwrap().push((service_uuid, save_state));
        if self.refused.lock().unwrap().contains(&service_uuid) {
            return Err(OrchestratorError::Forbidden("manual intervention".into()));
        }
        match self.services.lock().unwrap().remove(&service_uuid) {
            Some(_) => Ok(()),
            None => Err(OrchestratorError::NotFound(service_uuid)),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeProjectStore
// ---------------------------------------------------------------------------

struct FakeProject {
    info: ProjectInfo,
    workbench: HashSet<NodeId>,
}

#[derive(Default)]
pub struct FakeProjectStore {
    projects: Mutex<HashMap<ProjectId, FakeProject>>,
    /// `(user, project)` pairs with write access.
    writers: Mutex<HashSet<(UserId, ProjectId)>>,
    deleted: Mutex<Vec<ProjectId>>,
    reassigned: Mutex<Vec<(ProjectId, GroupId, GroupId)>>,
}

impl FakeProjectStore {
    pub fn add(&self, owner: UserId, access_rights: AccessRights, nodes: &[NodeId]) -> ProjectId {
        let id = Uuid::new_v4();
        self.insert(id, owner, access_rights, nodes);
        id
    }

    pub fn insert(
        &self,
        id: ProjectId,
        owner: UserId,
        access_rights: AccessRights,
        nodes: &[NodeId],
    ) {
        self.projects.lock().unwrap().insert(
            id,
            FakeProject {
                info: ProjectInfo {
                    uuid: id,
                    owner,
                    access_rights,
                },
                workbench: nodes.iter().copied().collect(),
            },
        );
    }

    pub fn add_node(&self, project_id: ProjectId, node: NodeId) {
        if let Some(p) = self.projects.lock().unwrap().get_mut(&project_id) {
            p.workbench.insert(node);
        }
    }

    pub fn grant_write(&self, user_id: UserId, project_id: ProjectId) {
        self.writers.lock().unwrap().insert((user_id, project_id));
    }

    pub fn deleted(&self) -> Vec<ProjectId> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn reassigned(&self) -> Vec<(ProjectId, GroupId, GroupId)> {
        self.reassigned.lock().unwrap().clone()
    }

    pub fn access_rights(&self, project_id: ProjectId) -> Option<AccessRights> {
        self.projects
            .lock()
            .unwrap()
            .get(&project_id)
            .map(|p| p.info.access_rights.clone())
    }
}

#[async_trait]
impl ProjectStore for FakeProjectStore {
    async fn get_workbench_node_ids(
        &self,
        project_id: ProjectId,
    ) -> Result<HashSet<NodeId>, DbError> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .get(&project_id)
            .map(|p| p.workbench.clone())
            .unwrap_or_default())
    }

    async fn node_id_in_any_workbench(&self, node_id: NodeId) -> Result<bool, DbError> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .values()
            .any(|p| p.workbench.contains(&node_id)))
    }

    async fn get_project(
        &self,
        project_id: ProjectId,
        _user_id: UserId,
    ) -> Result<ProjectInfo, DbError> {
        self.projects
            .lock()
            .unwrap()
            .get(&project_id)
            .map(|p| p.info.clone())
            .ok_or_else(|| DbError::not_found("project", project_id))
    }

    async fn list_owned_project_ids(&self, user_id: UserId) -> Result<Vec<ProjectId>, DbError> {
        let mut ids: Vec<ProjectId> = self
            .projects
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.info.owner == user_id)
            .map(|p| p.info.uuid)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn has_write_permission(
        &self,
        user_id: UserId,
        project_id: ProjectId,
    ) -> Result<bool, DbError> {
        Ok(self.writers.lock().unwrap().contains(&(user_id, project_id)))
    }

    async fn reassign_owner(
        &self,
        project_id: ProjectId,
        old_gid: GroupId,
        new_gid: GroupId,
    ) -> Result<(), DbError> {
        let mut projects = self.projects.lock().unwrap();
        let project = projects
            .get_mut(&project_id)
            .ok_or_else(|| DbError::not_found("project", project_id))?;
        project.info.access_rights.transfer_ownership(old_gid, new_gid);
        self.reassigned
            .lock()
            .unwrap()
            .push((project_id, old_gid, new_gid));
        Ok(())
    }

    async fn delete_project(&self, project_id: ProjectId, _user_id: UserId) -> Result<(), DbError> {
        if self.projects.lock().unwrap().remove(&project_id).is_some() {
            self.deleted.lock().unwrap().push(project_id);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeUserStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeUserStore {
    users: Mutex<BTreeMap<UserId, UserInfo>>,
    groups: Mutex<HashMap<GroupId, (GroupKind, Vec<UserId>)>>,
    deleted: Mutex<Vec<UserId>>,
    pub guest_listings: AtomicUsize,
    pub fail_guest_listing: AtomicBool,
    pub panic_on_guest_listing: AtomicBool,
}

impl FakeUserStore {
    /// Add a user whose primary group id is `id * 10`.
    pub fn add_user(&self, id: UserId, role: UserRole) -> GroupId {
        let primary_gid = id * 10;
        self.users.lock().unwrap().insert(
            id,
            UserInfo {
                id,
                name: format!("user-{id}"),
                primary_gid,
                role,
            },
        );
        self.groups
            .lock()
            .unwrap()
            .insert(primary_gid, (GroupKind::Primary, vec![id]));
        primary_gid
    }

    pub fn add_group(&self, gid: GroupId, kind: GroupKind, members: &[UserId]) {
        self.groups
            .lock()
            .unwrap()
            .insert(gid, (kind, members.to_vec()));
    }

    pub fn exists(&self, id: UserId) -> bool {
        self.users.lock().unwrap().contains_key(&id)
    }

    pub fn deleted(&self) -> Vec<UserId> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl UserStore for FakeUserStore {
    async fn get_user(&self, user_id: UserId) -> Result<UserInfo, DbError> {
        self.users
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .ok_or_else(|| DbError::not_found("user", user_id))
    }

    async fn list_guest_user_ids(&self) -> Result<Vec<(UserId, String)>, DbError> {
        self.guest_listings.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_guest_listing.load(Ordering::SeqCst) {
            panic!("guest listing exploded");
        }
        if self.fail_guest_listing.load(Ordering::SeqCst) {
            return Err(DbError::Database("connection reset".into()));
        }
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|u| u.role == UserRole::Guest)
            .map(|u| (u.id, u.name.clone()))
            .collect())
    }

    async fn delete_user(&self, user_id: UserId) -> Result<(), DbError> {
        if self.users.lock().unwrap().remove(&user_id).is_some() {
            self.deleted.lock().unwrap().push(user_id);
        }
        Ok(())
    }

    async fn get_group(&self, gid: GroupId) -> Result<Option<GroupInfo>, DbError> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .get(&gid)
            .map(|(kind, _)| GroupInfo { gid, kind: *kind }))
    }

    async fn list_group_member_ids(&self, gid: GroupId) -> Result<Vec<UserId>, DbError> {
        let mut members = self
            .groups
            .lock()
            .unwrap()
            .get(&gid)
            .map(|(_, m)| m.clone())
            .unwrap_or_default();
        members.sort_unstable();
        Ok(members)
    }

    async fn get_user_id_by_primary_gid(&self, gid: GroupId) -> Result<Option<UserId>, DbError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.primary_gid == gid)
            .map(|u| u.id))
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(ProjectId, ProjectLock)>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<(ProjectId, ProjectLock)> {
        self.events.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_project_lock_state_changed(&self, project_id: ProjectId, state: &ProjectLock) {
        self.events.lock().unwrap().push((project_id, state.clone()));
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub registry: ResourceRegistry,
    pub project_locks: ProjectLockFacade,
    pub orchestrator: Arc<FakeOrchestrator>,
    pub projects: Arc<FakeProjectStore>,
    pub users: Arc<FakeUserStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub gc: Arc<GarbageCollector>,
}

pub fn test_config() -> GcConfig {
    GcConfig {
        interval: Duration::from_secs(1),
        max_concurrency: 4,
        restart_delay: Duration::from_secs(1),
        heartbeat_ttl: Duration::from_secs(60),
        resource_deletion_timeout: Duration::from_secs(5),
        project_lock_ttl: Duration::from_secs(30),
        role_cache_ttl: Duration::from_secs(5),
        service_stop_timeout: Duration::from_secs(60),
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: GcConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let registry = ResourceRegistry::new(store.clone());
        let notifier = Arc::new(RecordingNotifier::default());
        let project_locks = ProjectLockFacade::new(
            LockManager::new(store.clone()),
            notifier.clone(),
            config.project_lock_ttl,
        );
        let orchestrator = Arc::new(FakeOrchestrator::default());
        let projects = Arc::new(FakeProjectStore::default());
        let users = Arc::new(FakeUserStore::default());

        let gc = Arc::new(GarbageCollector::new(
            GcDeps {
                registry: registry.clone(),
                project_locks: project_locks.clone(),
                orchestrator: orchestrator.clone(),
                projects: projects.clone(),
                users: users.clone(),
            },
            config,
        ));

        Self {
            store,
            registry,
            project_locks,
            orchestrator,
            projects,
            users,
            notifier,
            gc,
        }
    }

    /// A key holding `project_id` with no liveness marker.
    pub async fn dead_key(
        &self,
        user_id: UserId,
        session: &str,
        project_id: ProjectId,
    ) -> ResourceKey {
        let key = ResourceKey::session(user_id, session);
        self.registry
            .set_resource(&key, fields::PROJECT_ID, &project_id.to_string())
            .await
            .unwrap();
        key
    }

    /// A key holding `project_id` and alive for an hour.
    pub async fn alive_key(
        &self,
        user_id: UserId,
        session: &str,
        project_id: ProjectId,
    ) -> ResourceKey {
        let key = self.dead_key(user_id, session, project_id).await;
        self.registry.set_alive(&key, true, LONG_TTL).await.unwrap();
        key
    }

    pub async fn project_of(&self, key: &ResourceKey) -> Option<String> {
        self.registry
            .get_resources(key)
            .await
            .unwrap()
            .remove(fields::PROJECT_ID)
    }

    pub async fn user_keys(&self, user_id: UserId) -> Vec<ResourceKey> {
        self.registry.find_user_keys(user_id).await.unwrap()
    }
}

/// Access rights granting `OWNER` to `owner_gid` and `COLLABORATOR` to the
/// rest.
pub fn rights(owner_gid: GroupId, collaborators: &[GroupId]) -> AccessRights {
    std::iter::once((owner_gid, AccessFlags::OWNER))
        .chain(collaborators.iter().map(|gid| (*gid, AccessFlags::COLLABORATOR)))
        .collect()
}
