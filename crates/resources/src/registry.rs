//! Resource registry: the semantic layer over a [`ResourceStore`].
//!
//! In store jargon every client session is a *key*. A key holds zero or
//! more *fields* (`socket_id`, `project_id`, ...) and a liveness marker with
//! a TTL refreshed by client heartbeats:
//!
//! - a key is **alive** while its marker is present and unexpired;
//! - a key is **dead** once the marker lapsed but fields are still attached.
//!
//! Several keys can hold the same field value (two tabs of the same user
//! with the same project open). Such a value is in use as long as one of
//! its holders is alive.

use std::sync::Arc;
use std::time::Duration;

use keeper_core::resource::{ResourceKey, ResourceMap};
use keeper_core::store::{ResourceStore, StoreError};
use keeper_core::types::UserId;

/// Cheaply cloneable handle to the session registry.
#[derive(Clone)]
pub struct ResourceRegistry {
    store: Arc<dyn ResourceStore>,
}

impl ResourceRegistry {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    pub async fn set_resource(
        &self,
        key: &ResourceKey,
        field: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        tracing::debug!(%key, field, value, "Setting resource");
        self.store.set_resource(key, field, value).await
    }

    /// Detach `field` from `key`. Absent fields are ignored.
    pub async fn remove_resource(&self, key: &ResourceKey, field: &str) -> Result<(), StoreError> {
        tracing::debug!(%key, field, "Removing resource");
        self.store.remove_resource(key, field).await
    }

    pub async fn get_resources(&self, key: &ResourceKey) -> Result<ResourceMap, StoreError> {
        self.store.get_resources(key).await
    }

    /// Values of `field` held by every session selected by `key`.
    pub async fn find_resources(
        &self,
        key: &ResourceKey,
        field: &str,
    ) -> Result<Vec<String>, StoreError> {
        self.store.find_resources(key, field).await
    }

    /// Reverse lookup: every key holding `field = value`.
    pub async fn find_keys(
        &self,
        field: &str,
        value: &str,
    ) -> Result<Vec<ResourceKey>, StoreError> {
        self.store.find_keys(field, value).await
    }

    /// Every key of `user_id`, alive or dead.
    pub async fn find_user_keys(&self, user_id: UserId) -> Result<Vec<ResourceKey>, StoreError> {
        self.store.find_user_keys(user_id).await
    }

    /// Mark `key` alive for `ttl`, or drop its marker when `alive` is false.
    pub async fn set_alive(
        &self,
        key: &ResourceKey,
        alive: bool,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        if alive {
            tracing::debug!(%key, ttl_secs = ttl.as_secs(), "Refreshing liveness");
            self.store.set_alive(key, ttl).await
        } else {
            tracing::debug!(%key, "Clearing liveness");
            self.store.clear_alive(key).await
        }
    }

    pub async fn is_alive(&self, key: &ResourceKey) -> Result<bool, StoreError> {
        self.store.is_alive(key).await
    }

    /// `(alive, dead)` keys, judged by TTL state at call time.
    pub async fn get_all_keys(&self) -> Result<(Vec<ResourceKey>, Vec<ResourceKey>), StoreError> {
        self.store.all_keys().await
    }

    pub async fn remove_key(&self, key: &ResourceKey) -> Result<(), StoreError> {
        tracing::debug!(%key, "Removing key");
        self.store.remove_key(key).await
    }

    /// Remove `key` if it holds nothing and is not alive.
    ///
    /// Returns `true` if the key is gone afterwards.
    pub async fn prune_if_empty(&self, key: &ResourceKey) -> Result<bool, StoreError> {
        let pruned = self.store.remove_key_if_empty(key).await?;
        if pruned {
            tracing::debug!(%key, "Pruned empty key");
        }
        Ok(pruned)
    }
}
