//! Per-user assignment records.
//!
//! An assignment links one task to one user and carries that user's own
//! progress report, independent of the task's progress.

use serde::{Deserialize, Serialize};

use crate::ids::uuid_id;
use crate::profile::UserId;
use crate::task::{Progress, TaskId};

uuid_id! {
    /// Unique identifier for an assignment record.
    AssignmentId
}

/// Links one task to one assigned user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Record identifier.
    pub id: AssignmentId,
    /// Task being assigned.
    pub task_id: TaskId,
    /// Assigned user; the only one allowed to change `progress`.
    pub user_id: UserId,
    /// The assignee's own progress report.
    #[serde(default)]
    pub progress: Progress,
}

impl Assignment {
    /// Creates a fresh assignment with zero progress.
    #[must_use]
    pub fn new(task_id: TaskId, user_id: UserId) -> Self {
        Self {
            id: AssignmentId::new(),
            task_id,
            user_id,
            progress: Progress::ZERO,
        }
    }
}
