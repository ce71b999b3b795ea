//! Who is assigned to which task.
//!
//! A task may be assigned to several users. The task row's `assignee`
//! column holds only the first of them; the full set comes from the
//! assignment records, loaded with the board and kept live from the
//! assignments feed.

use std::collections::{BTreeSet, HashMap};

use taskboard_proto::assignment::Assignment;
use taskboard_proto::change::{ChangeEvent, ChangeKind};
use taskboard_proto::profile::UserId;
use taskboard_proto::task::{Task, TaskId};

/// Assigned users per task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssigneeIndex {
    by_task: HashMap<TaskId, BTreeSet<UserId>>,
}

impl AssigneeIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from fetched assignment rows.
    #[must_use]
    pub fn from_assignments<'a>(rows: impl IntoIterator<Item = &'a Assignment>) -> Self {
        let mut index = Self::new();
        for row in rows {
            index.insert(row);
        }
        index
    }

    /// Records one assignment. Returns whether it was new.
    pub fn insert(&mut self, row: &Assignment) -> bool {
        self.by_task
            .entry(row.task_id)
            .or_default()
            .insert(row.user_id.clone())
    }

    /// Forgets every assignment of a task.
    pub fn remove_task(&mut self, task_id: TaskId) -> bool {
        self.by_task.remove(&task_id).is_some()
    }

    /// Folds one assignments-feed event in. Returns whether the index changed.
    ///
    /// Progress updates never change who is assigned.
    pub fn apply_change(&mut self, event: &ChangeEvent<Assignment>) -> bool {
        match event.kind {
            ChangeKind::Insert => event.new.as_ref().is_some_and(|row| self.insert(row)),
            ChangeKind::Update => false,
            ChangeKind::Delete => {
                let Some(row) = event.old.as_ref().or(event.new.as_ref()) else {
                    return false;
                };
                let Some(users) = self.by_task.get_mut(&row.task_id) else {
                    return false;
                };
                let removed = users.remove(&row.user_id);
                if users.is_empty() {
                    self.by_task.remove(&row.task_id);
                }
                removed
            }
        }
    }

    /// Whether `user` is assigned to `task`, by column or by record.
    #[must_use]
    pub fn is_assigned(&self, task: &Task, user: &UserId) -> bool {
        task.assignee.as_ref() == Some(user)
            || self
                .by_task
                .get(&task.id)
                .is_some_and(|users| users.contains(user))
    }

    /// Whether `user` may move `task`'s progress: its creator or any assignee.
    #[must_use]
    pub fn may_update_progress(&self, task: &Task, user: &UserId) -> bool {
        task.is_owned_by(user) || self.is_assigned(task, user)
    }

    /// Everyone assigned to `task`, the column assignee first.
    #[must_use]
    pub fn users(&self, task: &Task) -> Vec<UserId> {
        let mut users: Vec<UserId> = task.assignee.iter().cloned().collect();
        if let Some(recorded) = self.by_task.get(&task.id) {
            users.extend(
                recorded
                    .iter()
                    .filter(|u| task.assignee.as_ref() != Some(*u))
                    .cloned(),
            );
        }
        users
    }
}
