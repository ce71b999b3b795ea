//! Presence channel types.
//!
//! The presence channel pushes total membership snapshots: each
//! [`PresenceSnapshot`] lists every client currently tracked, grouped by
//! presence key (the user identifier). A user with several open clients
//! appears once with several metas.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::profile::UserId;

/// Online status derived from presence membership.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresenceStatus {
    /// Present in the latest snapshot.
    Online,
    /// Absent from the latest snapshot, or not yet matched.
    #[default]
    Offline,
}

impl PresenceStatus {
    /// Whether the status is [`PresenceStatus::Online`].
    #[must_use]
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Metadata a client announces when it tracks its own presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMeta {
    /// Announcing user.
    pub user_id: UserId,
    /// Display name at the time of announcing.
    #[serde(rename = "username")]
    pub display_name: String,
}

/// Authoritative, total membership of the presence channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresenceSnapshot {
    members: BTreeMap<UserId, Vec<PresenceMeta>>,
}

impl PresenceSnapshot {
    /// Builds a snapshot from `(key, meta)` pairs.
    pub fn from_members(members: impl IntoIterator<Item = (UserId, PresenceMeta)>) -> Self {
        let mut snapshot = Self::default();
        for (key, meta) in members {
            snapshot.members.entry(key).or_default().push(meta);
        }
        snapshot
    }

    /// Identifiers present in this snapshot.
    #[must_use]
    pub fn present_users(&self) -> HashSet<UserId> {
        self.members.keys().cloned().collect()
    }

    /// Whether `user` is present.
    #[must_use]
    pub fn contains(&self, user: &UserId) -> bool {
        self.members.contains_key(user)
    }

    /// Metas announced under `user`'s key.
    #[must_use]
    pub fn metas(&self, user: &UserId) -> &[PresenceMeta] {
        self.members.get(user).map_or(&[], Vec::as_slice)
    }

    /// Number of distinct present users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether nobody is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
