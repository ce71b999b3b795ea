//! Presence tracking over the profile directory.
//!
//! The profile directory (identifier and display name) is fetched once and
//! never changed by presence traffic. [`PresenceTracker`] layers an online
//! flag over it, recomputed from every total membership snapshot: present
//! in the snapshot means online, absent means offline. Snapshots may arrive
//! before the directory; the latest one is kept and applied when the
//! directory loads.

use std::collections::{HashMap, HashSet};

use taskboard_proto::presence::{PresenceMeta, PresenceSnapshot, PresenceStatus};
use taskboard_proto::profile::{Profile, UNKNOWN_USER_NAME, UserId};

use crate::backend::{Backend, PresenceChannel};

/// A profile joined with its live presence status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileView {
    /// User identifier.
    pub id: UserId,
    /// Resolved display name.
    pub display_name: String,
    /// Live status.
    pub status: PresenceStatus,
}

#[derive(Debug, Clone)]
struct Entry {
    profile: Profile,
    status: PresenceStatus,
}

/// Online/offline layer over the profile directory.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    directory: HashMap<UserId, Entry>,
    /// Users present in the latest snapshot.
    present: HashSet<UserId>,
    loaded: bool,
    shut_down: bool,
}

impl PresenceTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the profile directory, replacing any previous one, and
    /// applies the latest snapshot to it.
    pub fn load_directory(&mut self, profiles: Vec<Profile>) {
        if self.shut_down {
            return;
        }
        self.directory = profiles
            .into_iter()
            .map(|profile| {
                let status = self.status_from_snapshot(&profile.id);
                (profile.id.clone(), Entry { profile, status })
            })
            .collect();
        self.loaded = true;
        tracing::debug!(profiles = self.directory.len(), "profile directory loaded");
    }

    /// Recomputes every known profile's flag from a total snapshot.
    ///
    /// Returns the number of known profiles now online. Ignored after
    /// [`shutdown`](Self::shutdown).
    pub fn apply_snapshot(&mut self, snapshot: &PresenceSnapshot) -> usize {
        if self.shut_down {
            tracing::debug!("presence snapshot after shutdown ignored");
            return 0;
        }
        self.present = snapshot.present_users();
        let mut online = 0;
        for (id, entry) in &mut self.directory {
            entry.status = if self.present.contains(id) {
                online += 1;
                PresenceStatus::Online
            } else {
                PresenceStatus::Offline
            };
        }
        tracing::trace!(present = self.present.len(), online, "presence snapshot applied");
        online
    }

    /// Announces own presence on `channel`, at most once per channel.
    ///
    /// Failure is logged and leaves the channel joined; the user appears
    /// offline to others until a later attempt succeeds. Returns whether
    /// this call announced.
    pub async fn announce<B: Backend>(
        &self,
        channel: &mut PresenceChannel<B>,
        meta: PresenceMeta,
    ) -> bool {
        if self.shut_down {
            return false;
        }
        match channel.announce(meta).await {
            Ok(announced) => announced,
            Err(e) => {
                tracing::warn!(key = %channel.key(), error = %e, "failed to announce presence");
                false
            }
        }
    }

    /// Live status of `user`. Unknown users are offline.
    #[must_use]
    pub fn status(&self, user: &UserId) -> PresenceStatus {
        self.directory
            .get(user)
            .map_or(PresenceStatus::Offline, |e| e.status)
    }

    /// Whether `user` is in the directory.
    #[must_use]
    pub fn knows(&self, user: &UserId) -> bool {
        self.directory.contains_key(user)
    }

    /// Resolved profile of `user`, with a placeholder for unknown users.
    #[must_use]
    pub fn profile(&self, user: &UserId) -> ProfileView {
        self.directory.get(user).map_or_else(
            || ProfileView {
                id: user.clone(),
                display_name: UNKNOWN_USER_NAME.to_string(),
                status: PresenceStatus::Offline,
            },
            |entry| ProfileView {
                id: user.clone(),
                display_name: entry.profile.display_name().to_string(),
                status: entry.status,
            },
        )
    }

    /// Every known profile, sorted by display name then identifier.
    #[must_use]
    pub fn profiles(&self) -> Vec<ProfileView> {
        let mut views: Vec<ProfileView> = self.directory.keys().map(|id| self.profile(id)).collect();
        views.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.id.cmp(&b.id))
        });
        views
    }

    /// Every known profile except `user`, for assignment pickers.
    #[must_use]
    pub fn assignable(&self, user: &UserId) -> Vec<ProfileView> {
        self.profiles().into_iter().filter(|p| p.id != *user).collect()
    }

    /// Number of known profiles currently online.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.directory
            .values()
            .filter(|e| e.status.is_online())
            .count()
    }

    /// Whether the directory has been loaded.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Stops all further flag mutation.
    pub fn shutdown(&mut self) {
        self.shut_down = true;
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub const fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn status_from_snapshot(&self, user: &UserId) -> PresenceStatus {
        if self.present.contains(user) {
            PresenceStatus::Online
        } else {
            PresenceStatus::Offline
        }
    }
}
