//! Shared-store abstractions used by every replica.
//!
//! [`ResourceStore`] is the key/value registry of client sessions and
//! [`LockStore`] provides named leases. Both must make every single
//! operation atomic at the store level: callers never perform a
//! read-modify-write cycle on top of them.

use std::time::Duration;

use async_trait::async_trait;

use crate::resource::{ResourceKey, ResourceMap};
use crate::types::UserId;

/// Errors surfaced by a shared store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or the statement failed. Transient:
    /// callers log it and retry on their next pass.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be decoded.
    #[error("Malformed store value: {0}")]
    Decode(String),

    /// A wildcard key was passed to an operation that needs a single session.
    #[error("Operation requires a concrete key, got {0}")]
    InvalidKey(ResourceKey),
}

/// Registry of client sessions and the resources they hold.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Attach (or overwrite) `field = value` on a concrete key.
    async fn set_resource(
        &self,
        key: &ResourceKey,
        field: &str,
        value: &str,
    ) -> Result<(), StoreError>;

    /// Detach `field` from a concrete key. Absent fields are ignored.
    async fn remove_resource(&self, key: &ResourceKey, field: &str) -> Result<(), StoreError>;

    /// All resources held by a concrete key.
    async fn get_resources(&self, key: &ResourceKey) -> Result<ResourceMap, StoreError>;

    /// Values of `field` across every key selected by `key` (wildcards allowed).
    async fn find_resources(
        &self,
        key: &ResourceKey,
        field: &str,
    ) -> Result<Vec<String>, StoreError>;

    /// Every key currently holding `field = value`.
    async fn find_keys(&self, field: &str, value: &str) -> Result<Vec<ResourceKey>, StoreError>;

    /// Every key of `user_id` that holds resources or a liveness marker.
    async fn find_user_keys(&self, user_id: UserId) -> Result<Vec<ResourceKey>, StoreError>;

    /// Set (or refresh) the liveness marker of a concrete key.
    async fn set_alive(&self, key: &ResourceKey, ttl: Duration) -> Result<(), StoreError>;

    /// Drop the liveness marker of a concrete key.
    async fn clear_alive(&self, key: &ResourceKey) -> Result<(), StoreError>;

    /// `true` while the key's liveness marker is present and unexpired.
    async fn is_alive(&self, key: &ResourceKey) -> Result<bool, StoreError>;

    /// Partition all keys by the liveness state observed during this call.
    ///
    /// The first list holds keys with a live marker, the second holds keys
    /// that still carry resources but whose marker is gone or expired.
    async fn all_keys(&self) -> Result<(Vec<ResourceKey>, Vec<ResourceKey>), StoreError>;

    /// Drop every resource and the liveness marker of a concrete key.
    async fn remove_key(&self, key: &ResourceKey) -> Result<(), StoreError>;

    /// Drop a concrete key only if it holds no resources and is not alive.
    ///
    /// Returns `true` if the key no longer exists afterwards.
    async fn remove_key_if_empty(&self, key: &ResourceKey) -> Result<bool, StoreError>;
}

/// Named, expiring, single-holder leases.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Take `name` for `token` unless a live lease exists. Returns `true` on
    /// success. An expired lease is replaced.
    async fn try_acquire(
        &self,
        name: &str,
        token: &str,
        payload: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Push the expiry of a lease held by `token`. Returns `false` if the
    /// lease is gone or belongs to someone else.
    async fn extend(&self, name: &str, token: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Release a lease held by `token`. Releasing a lease that is not held
    /// by `token` is a no-op returning `false`.
    async fn release(&self, name: &str, token: &str) -> Result<bool, StoreError>;

    /// Payload of the live lease on `name`, if any.
    async fn get_payload(&self, name: &str) -> Result<Option<String>, StoreError>;

    /// `true` while a live lease on `name` exists.
    async fn is_locked(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.get_payload(name).await?.is_some())
    }
}
