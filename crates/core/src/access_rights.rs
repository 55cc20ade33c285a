//! Project access rights: a typed map from group id to permission flags.
//!
//! Stored as a JSON object keyed by the group id (`{"12": {"read": true,
//! "write": true, "delete": false}}`) in the `projects.access_rights` column.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::GroupId;

/// Permission flags granted to one group on one project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessFlags {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
}

impl AccessFlags {
    /// Full control; granted to the project owner's primary group.
    pub const OWNER: AccessFlags = AccessFlags {
        read: true,
        write: true,
        delete: true,
    };

    /// Read and write, no delete.
    pub const COLLABORATOR: AccessFlags = AccessFlags {
        read: true,
        write: true,
        delete: false,
    };

    /// Read only.
    pub const VIEWER: AccessFlags = AccessFlags {
        read: true,
        write: false,
        delete: false,
    };

    /// Flag-wise OR of two grants.
    pub fn union(self, other: AccessFlags) -> AccessFlags {
        AccessFlags {
            read: self.read || other.read,
            write: self.write || other.write,
            delete: self.delete || other.delete,
        }
    }
}

/// Access rights of a project, ordered by group id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessRights(BTreeMap<GroupId, AccessFlags>);

impl AccessRights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, gid: GroupId) -> Option<AccessFlags> {
        self.0.get(&gid).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (GroupId, AccessFlags)> + '_ {
        self.0.iter().map(|(gid, flags)| (*gid, *flags))
    }

    /// Set the grant of `gid`, replacing any previous one.
    pub fn grant(&mut self, gid: GroupId, flags: AccessFlags) {
        self.0.insert(gid, flags);
    }

    /// Remove the grant of `gid`, returning it if it existed.
    pub fn revoke(&mut self, gid: GroupId) -> Option<AccessFlags> {
        self.0.remove(&gid)
    }

    /// OR `flags` into the existing grant of `gid` (or insert it).
    pub fn merge(&mut self, gid: GroupId, flags: AccessFlags) {
        let merged = self.get(gid).unwrap_or_default().union(flags);
        self.0.insert(gid, merged);
    }

    /// Groups other than `excluded` holding write access, in id order.
    pub fn writers_except(&self, excluded: GroupId) -> Vec<GroupId> {
        self.iter()
            .filter(|(gid, flags)| *gid != excluded && flags.write)
            .map(|(gid, _)| gid)
            .collect()
    }

    /// Hand the project from `old_owner` to `new_owner`.
    ///
    /// The old owner's entry is removed and the new owner receives the
    /// [`AccessFlags::OWNER`] preset, upgrading any grant it already had.
    pub fn transfer_ownership(&mut self, old_owner: GroupId, new_owner: GroupId) {
        self.revoke(old_owner);
        self.grant(new_owner, AccessFlags::OWNER);
    }
}

impl FromIterator<(GroupId, AccessFlags)> for AccessRights {
    fn from_iter<T: IntoIterator<Item = (GroupId, AccessFlags)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
