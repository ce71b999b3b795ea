//! Notification rows created as a side effect of task assignment.

use serde::{Deserialize, Serialize};

use crate::ids::uuid_id;
use crate::profile::UserId;
use crate::task::TaskId;

uuid_id! {
    /// Unique identifier for a notification.
    NotificationId
}

/// A message addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Record identifier.
    pub id: NotificationId,
    /// Recipient; the only user who may read or mark it.
    pub user_id: UserId,
    /// Human-readable text.
    pub message: String,
    /// Task the notification is about, if any.
    #[serde(default, rename = "related_task_id")]
    pub related_task: Option<TaskId>,
    /// Whether the recipient has marked it read.
    #[serde(default, rename = "is_read")]
    pub read: bool,
    /// Creation time in milliseconds since epoch.
    pub created_at: u64,
}

/// Columns supplied when creating a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    /// Recipient.
    pub user_id: UserId,
    /// Human-readable text.
    pub message: String,
    /// Task the notification is about, if any.
    pub related_task: Option<TaskId>,
}

/// Message text sent to a user when a task is assigned to them.
#[must_use]
pub fn assignment_message(task_title: &str) -> String {
    format!("Task \"{task_title}\" has been assigned to you.")
}
