//! Resource keys and well-known resource field names.
//!
//! A [`ResourceKey`] identifies one connected client session. Each key holds
//! a small map of named resources (socket id, open project, ...) plus a
//! TTL-backed liveness marker kept fresh by client heartbeats.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// Well-known resource field names.
pub mod fields {
    /// Websocket id of the client session.
    pub const SOCKET_ID: &str = "socket_id";
    /// Project currently opened in the client session.
    pub const PROJECT_ID: &str = "project_id";
}

/// Resources attached to a key, ordered by field name.
pub type ResourceMap = BTreeMap<String, String>;

/// Identity of one client session.
///
/// `client_session_id == None` stands for "any session of this user" and is
/// only meaningful for aggregate lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub user_id: UserId,
    pub client_session_id: Option<String>,
}

impl ResourceKey {
    /// Key of a concrete client session.
    pub fn session(user_id: UserId, client_session_id: impl Into<String>) -> Self {
        Self {
            user_id,
            client_session_id: Some(client_session_id.into()),
        }
    }

    /// Wildcard key matching every session of `user_id`.
    pub fn any_session(user_id: UserId) -> Self {
        Self {
            user_id,
            client_session_id: None,
        }
    }

    /// `true` if this key names a single session.
    pub fn is_concrete(&self) -> bool {
        self.client_session_id.is_some()
    }

    /// `true` if `other` (always concrete) is selected by this key.
    pub fn matches(&self, other: &ResourceKey) -> bool {
        self.user_id == other.user_id
            && match &self.client_session_id {
                None => true,
                Some(sid) => other.client_session_id.as_deref() == Some(sid.as_str()),
            }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user_id={}:client_session_id={}",
            self.user_id,
            self.client_session_id.as_deref().unwrap_or("*")
        )
    }
}
