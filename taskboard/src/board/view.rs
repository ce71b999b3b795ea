//! Read-only projections of the task collection.
//!
//! Filters and counts are re-derived from the base collection on every call
//! and never mutate it.

use std::cmp::Reverse;

use taskboard_proto::profile::UserId;
use taskboard_proto::task::Task;

use super::assignees::AssigneeIndex;
use crate::presence::{PresenceTracker, ProfileView};

/// Which tasks a view shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TaskFilter {
    /// Every task.
    #[default]
    All,
    /// Tasks below 100% progress.
    Active,
    /// Tasks at 100% progress.
    Completed,
    /// Tasks the given user is assigned to.
    AssignedTo(UserId),
}

impl TaskFilter {
    /// Parses a filter name (`all`, `active`, `completed`, `assigned`).
    /// `assigned` resolves to tasks assigned to `viewer`.
    #[must_use]
    pub fn parse(name: &str, viewer: &UserId) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "assigned" => Some(Self::AssignedTo(viewer.clone())),
            _ => None,
        }
    }

    /// Whether `task` passes this filter.
    #[must_use]
    pub fn matches(&self, task: &Task, assignees: &AssigneeIndex) -> bool {
        match self {
            Self::All => true,
            Self::Active => !task.is_complete(),
            Self::Completed => task.is_complete(),
            Self::AssignedTo(user) => assignees.is_assigned(task, user),
        }
    }
}

/// Tasks passing `filter`, in collection order.
#[must_use]
pub fn filter<'a>(tasks: &'a [Task], filter: &TaskFilter, assignees: &AssigneeIndex) -> Vec<&'a Task> {
    tasks.iter().filter(|t| filter.matches(t, assignees)).collect()
}

/// Per-status task counts shown in filter tabs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    /// All tasks.
    pub all: usize,
    /// Tasks below 100%.
    pub active: usize,
    /// Tasks at 100%.
    pub completed: usize,
    /// Tasks assigned to the viewer.
    pub assigned_to_me: usize,
}

/// Counts tasks by status for `viewer`.
#[must_use]
pub fn counts(tasks: &[Task], viewer: &UserId, assignees: &AssigneeIndex) -> StatusCounts {
    tasks.iter().fold(StatusCounts::default(), |mut acc, task| {
        acc.all += 1;
        if task.is_complete() {
            acc.completed += 1;
        } else {
            acc.active += 1;
        }
        if assignees.is_assigned(task, viewer) {
            acc.assigned_to_me += 1;
        }
        acc
    })
}

/// Sorts by priority (high, medium, low, none), then newest first.
pub fn sort_by_priority(tasks: &mut [&Task]) {
    tasks.sort_by_key(|t| {
        (
            t.priority.map_or(u8::MAX, |p| p.rank()),
            Reverse(t.created_at),
        )
    });
}

/// A task joined with its creator's and assignees' profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRowView<'a> {
    /// The task.
    pub task: &'a Task,
    /// Creator with live presence.
    pub creator: ProfileView,
    /// Assignees with live presence, the column assignee first.
    pub assignees: Vec<ProfileView>,
    /// Whether the viewer is one of the assignees.
    pub assigned_to_me: bool,
    /// Whether the viewer may edit or delete.
    pub editable: bool,
}

/// Joins tasks with the profile directory at render time.
#[must_use]
pub fn join_profiles<'a>(
    tasks: &[&'a Task],
    presence: &PresenceTracker,
    assignees: &AssigneeIndex,
    viewer: &UserId,
) -> Vec<TaskRowView<'a>> {
    tasks
        .iter()
        .map(|&task| TaskRowView {
            task,
            creator: presence.profile(&task.created_by),
            assignees: assignees
                .users(task)
                .iter()
                .map(|id| presence.profile(id))
                .collect(),
            assigned_to_me: assignees.is_assigned(task, viewer),
            editable: task.is_owned_by(viewer),
        })
        .collect()
}
