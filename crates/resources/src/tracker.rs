//! Session tracker used by request and websocket handlers.
//!
//! [`SessionTracker::session`] returns a [`SessionResources`] handle bound to
//! one `(user, client session)` pair. Handlers attach and detach resources
//! through it and keep the session alive with heartbeats. On disconnect the
//! liveness marker is shortened to the resource-deletion timeout; once it
//! lapses the garbage collector takes over.

use std::time::Duration;

use keeper_core::resource::{fields, ResourceKey};
use keeper_core::store::StoreError;
use keeper_core::types::UserId;

use crate::registry::ResourceRegistry;

/// Liveness TTLs applied by the tracker.
#[derive(Debug, Clone, Copy)]
pub struct TrackerTtls {
    /// Marker TTL while the client is connected; refreshed by heartbeats.
    pub heartbeat: Duration,
    /// Marker TTL after a disconnect. Resources are released once it lapses.
    pub resource_deletion: Duration,
}

#[derive(Clone)]
pub struct SessionTracker {
    registry: ResourceRegistry,
    ttls: TrackerTtls,
}

impl SessionTracker {
    pub fn new(registry: ResourceRegistry, ttls: TrackerTtls) -> Self {
        Self { registry, ttls }
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Handle on one client session.
    pub fn session(
        &self,
        user_id: UserId,
        client_session_id: impl Into<String>,
    ) -> SessionResources<'_> {
        SessionResources {
            tracker: self,
            key: ResourceKey::session(user_id, client_session_id),
        }
    }

    /// Users holding `field = value` in any session, deduplicated.
    pub async fn find_users_of_resource(
        &self,
        field: &str,
        value: &str,
    ) -> Result<Vec<UserId>, StoreError> {
        let mut users: Vec<UserId> = self
            .registry
            .find_keys(field, value)
            .await?
            .into_iter()
            .map(|k| k.user_id)
            .collect();
        users.sort_unstable();
        users.dedup();
        Ok(users)
    }
}

/// Resources of one client session.
pub struct SessionResources<'a> {
    tracker: &'a SessionTracker,
    key: ResourceKey,
}

impl SessionResources<'_> {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Record the websocket of this session and mark it alive.
    pub async fn set_socket_id(&self, socket_id: &str) -> Result<(), StoreError> {
        tracing::debug!(key = %self.key, socket_id, "Session connected");
        self.tracker
            .registry
            .set_resource(&self.key, fields::SOCKET_ID, socket_id)
            .await?;
        self.heartbeat().await
    }

    pub async fn get_socket_id(&self) -> Result<Option<String>, StoreError> {
        self.get(fields::SOCKET_ID).await
    }

    /// Websocket ids of every session of this user.
    pub async fn find_socket_ids(&self) -> Result<Vec<String>, StoreError> {
        self.tracker
            .registry
            .find_resources(&ResourceKey::any_session(self.key.user_id), fields::SOCKET_ID)
            .await
    }

    /// Refresh the liveness marker with the heartbeat TTL.
    pub async fn heartbeat(&self) -> Result<(), StoreError> {
        self.tracker
            .registry
            .set_alive(&self.key, true, self.tracker.ttls.heartbeat)
            .await
    }

    /// The websocket went away without an explicit logout.
    ///
    /// The socket id is dropped and the marker is set to the deletion
    /// timeout so a reconnecting tab keeps its resources.
    pub async fn socket_disconnected(&self) -> Result<(), StoreError> {
        tracing::debug!(key = %self.key, "Session disconnected");
        self.tracker
            .registry
            .remove_resource(&self.key, fields::SOCKET_ID)
            .await?;
        self.tracker
            .registry
            .set_alive(&self.key, true, self.tracker.ttls.resource_deletion)
            .await
    }

    /// The user logged out or closed the session explicitly.
    pub async fn user_pressed_disconnect(&self) -> Result<(), StoreError> {
        tracing::debug!(key = %self.key, "User pressed disconnect");
        self.socket_disconnected().await
    }

    /// Attach `field = value` to this session.
    pub async fn add(&self, field: &str, value: &str) -> Result<(), StoreError> {
        self.tracker.registry.set_resource(&self.key, field, value).await
    }

    pub async fn remove(&self, field: &str) -> Result<(), StoreError> {
        self.tracker.registry.remove_resource(&self.key, field).await
    }

    pub async fn get(&self, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .tracker
            .registry
            .get_resources(&self.key)
            .await?
            .remove(field))
    }

    /// Values of `field` across every session of this user.
    pub async fn find_all(&self, field: &str) -> Result<Vec<String>, StoreError> {
        self.tracker
            .registry
            .find_resources(&ResourceKey::any_session(self.key.user_id), field)
            .await
    }

    pub async fn is_alive(&self) -> Result<bool, StoreError> {
        self.tracker.registry.is_alive(&self.key).await
    }
}
