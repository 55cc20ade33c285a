//! In-process implementation of the shared stores.
//!
//! [`MemoryStore`] implements both [`ResourceStore`] and [`LockStore`] on top
//! of `tokio::sync::RwLock`-guarded maps. Expiry is measured with
//! [`tokio::time::Instant`], so tests can pause and advance the clock.
//!
//! It is the store of single-replica deployments and of the test suites; a
//! fleet of replicas must share the Postgres-backed stores instead.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use keeper_core::resource::{ResourceKey, ResourceMap};
use keeper_core::store::{LockStore, ResourceStore, StoreError};
use keeper_core::types::UserId;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// A lease held on a named lock.
struct Lease {
    token: String,
    payload: String,
    expires_at: Instant,
}

#[derive(Default)]
struct Sessions {
    resources: HashMap<ResourceKey, ResourceMap>,
    /// Liveness markers and their expiry.
    alive: HashMap<ResourceKey, Instant>,
}

impl Sessions {
    fn is_alive(&self, key: &ResourceKey, now: Instant) -> bool {
        self.alive.get(key).is_some_and(|exp| *exp > now)
    }
}

/// Shared-nothing store for one process.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<Sessions>,
    locks: RwLock<HashMap<String, Lease>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn require_concrete(key: &ResourceKey) -> Result<(), StoreError> {
    if key.is_concrete() {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.clone()))
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn set_resource(
        &self,
        key: &ResourceKey,
        field: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        require_concrete(key)?;
        self.sessions
            .write()
            .await
            .resources
            .entry(key.clone())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_resource(&self, key: &ResourceKey, field: &str) -> Result<(), StoreError> {
        require_concrete(key)?;
        let mut sessions = self.sessions.write().await;
        if let Some(map) = sessions.resources.get_mut(key) {
            map.remove(field);
            if map.is_empty() {
                sessions.resources.remove(key);
            }
        }
        Ok(())
    }

    async fn get_resources(&self, key: &ResourceKey) -> Result<ResourceMap, StoreError> {
        require_concrete(key)?;
        Ok(self
            .sessions
            .read()
            .await
            .resources
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_resources(
        &self,
        key: &ResourceKey,
        field: &str,
    ) -> Result<Vec<String>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut values: Vec<String> = sessions
            .resources
            .iter()
            .filter(|(k, _)| key.matches(k))
            .filter_map(|(_, map)| map.get(field).cloned())
            .collect();
        values.sort();
        Ok(values)
    }

    async fn find_keys(&self, field: &str, value: &str) -> Result<Vec<ResourceKey>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut keys: Vec<ResourceKey> = sessions
            .resources
            .iter()
            .filter(|(_, map)| map.get(field).map(String::as_str) == Some(value))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn find_user_keys(&self, user_id: UserId) -> Result<Vec<ResourceKey>, StoreError> {
        let now = Instant::now();
        let sessions = self.sessions.read().await;
        let mut keys: Vec<ResourceKey> = sessions
            .resources
            .keys()
            .chain(
                sessions
                    .alive
                    .iter()
                    .filter(|(_, exp)| **exp > now)
                    .map(|(k, _)| k),
            )
            .filter(|k| k.user_id == user_id)
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn set_alive(&self, key: &ResourceKey, ttl: Duration) -> Result<(), StoreError> {
        require_concrete(key)?;
        self.sessions
            .write()
            .await
            .alive
            .insert(key.clone(), Instant::now() + ttl);
        Ok(())
    }

    async fn clear_alive(&self, key: &ResourceKey) -> Result<(), StoreError> {
        require_concrete(key)?;
        self.sessions.write().await.alive.remove(key);
        Ok(())
    }

    async fn is_alive(&self, key: &ResourceKey) -> Result<bool, StoreError> {
        require_concrete(key)?;
        Ok(self.sessions.read().await.is_alive(key, Instant::now()))
    }

    async fn all_keys(&self) -> Result<(Vec<ResourceKey>, Vec<ResourceKey>), StoreError> {
        let now = Instant::now();
        let sessions = self.sessions.read().await;

        let mut alive: Vec<ResourceKey> = sessions
            .alive
            .iter()
            .filter(|(_, exp)| **exp > now)
            .map(|(k, _)| k.clone())
            .collect();
        // Dead keys hold fields without a live marker, or are nothing but
        // an expired marker left behind by a disconnect.
        let mut dead: Vec<ResourceKey> = sessions
            .resources
            .keys()
            .filter(|k| !sessions.is_alive(k, now))
            .chain(
                sessions
                    .alive
                    .iter()
                    .filter(|(k, exp)| **exp <= now && !sessions.resources.contains_key(*k))
                    .map(|(k, _)| k),
            )
            .cloned()
            .collect();

        alive.sort();
        dead.sort();
        Ok((alive, dead))
    }

    async fn remove_key(&self, key: &ResourceKey) -> Result<(), StoreError> {
        require_concrete(key)?;
        let mut sessions = self.sessions.write().await;
        sessions.resources.remove(key);
        sessions.alive.remove(key);
        Ok(())
    }

    async fn remove_key_if_empty(&self, key: &ResourceKey) -> Result<bool, StoreError> {
        require_concrete(key)?;
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let has_resources = sessions
            .resources
            .get(key)
            .is_some_and(|map| !map.is_empty());
        if has_resources || sessions.is_alive(key, now) {
            return Ok(false);
        }
        sessions.resources.remove(key);
        sessions.alive.remove(key);
        Ok(true)
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn try_acquire(
        &self,
        name: &str,
        token: &str,
        payload: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut locks = self.locks.write().await;
        if locks.get(name).is_some_and(|lease| lease.expires_at > now) {
            return Ok(false);
        }
        locks.insert(
            name.to_string(),
            Lease {
                token: token.to_string(),
                payload: payload.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn extend(&self, name: &str, token: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut locks = self.locks.write().await;
        match locks.get_mut(name) {
            Some(lease) if lease.token == token && lease.expires_at > now => {
                lease.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, name: &str, token: &str) -> Result<bool, StoreError> {
        let mut locks = self.locks.write().await;
        if locks.get(name).is_some_and(|lease| lease.token == token) {
            locks.remove(name);
            return Ok(true);
        }
        Ok(false)
    }

    async fn get_payload(&self, name: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        Ok(self
            .locks
            .read()
            .await
            .get(name)
            .filter(|lease| lease.expires_at > now)
            .map(|lease| lease.payload.clone()))
    }
}
