//! Task rows for the shared board.
//!
//! [`Task`] is the complete, validated row held by clients. [`TaskRow`] is
//! the shape carried by the change feed, where every column is optional so
//! that update events can carry only the columns that changed. Nullable
//! columns use `Option<Option<T>>`: the outer `None` means "not present in
//! this event", `Some(None)` means "set to null".

use serde::{Deserialize, Deserializer, Serialize};

use crate::ids::uuid_id;
use crate::profile::UserId;

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

uuid_id! {
    /// Unique identifier for a task, based on UUID v7 for time-ordering.
    TaskId
}

/// Optional urgency label on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Can wait.
    Low,
    /// Default urgency.
    Medium,
    /// Needs attention first.
    High,
}

impl Priority {
    /// Sort rank, most urgent first. Tasks without a priority rank after `Low`.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Error returned when parsing an unknown priority label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown priority: {0}")]
pub struct UnknownPriority(pub String);

impl std::str::FromStr for Priority {
    type Err = UnknownPriority;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(UnknownPriority(other.to_string())),
        }
    }
}

/// Error returned when a progress value is above 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("progress must be between 0 and 100, got {0}")]
pub struct ProgressOutOfRange(pub u8);

/// Completion percentage in `0..=100`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct Progress(u8);

impl Progress {
    /// Nothing done yet.
    pub const ZERO: Self = Self(0);
    /// Fully complete.
    pub const COMPLETE: Self = Self(100);

    /// Creates a progress value.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressOutOfRange`] if `value` exceeds 100.
    pub const fn new(value: u8) -> Result<Self, ProgressOutOfRange> {
        if value > 100 {
            Err(ProgressOutOfRange(value))
        } else {
            Ok(Self(value))
        }
    }

    /// Creates a progress value, saturating at 100.
    #[must_use]
    pub const fn clamped(value: u8) -> Self {
        if value > 100 { Self(100) } else { Self(value) }
    }

    /// Returns the percentage.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Whether the work is finished.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        self.0 == 100
    }
}

impl TryFrom<u8> for Progress {
    type Error = ProgressOutOfRange;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Progress> for u8 {
    fn from(p: Progress) -> Self {
        p.0
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// A task on the shared board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Server-assigned identifier.
    pub id: TaskId,
    /// Short summary, never empty.
    pub title: String,
    /// Longer free-form detail.
    #[serde(default)]
    pub description: Option<String>,
    /// Completion percentage; the task is complete at 100.
    #[serde(default, rename = "progress_perc")]
    pub progress: Progress,
    /// User allowed to move this task's progress besides its creator.
    #[serde(default, rename = "assigned_to_user")]
    pub assignee: Option<UserId>,
    /// Creator and permanent owner.
    #[serde(rename = "user_id")]
    pub created_by: UserId,
    /// Creation time in milliseconds since epoch.
    pub created_at: u64,
    /// Optional urgency label.
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl Task {
    /// Whether progress has reached 100.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.progress.is_complete()
    }

    /// Whether `user` may change title, description, assignee, priority,
    /// or delete the task.
    #[must_use]
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        self.created_by == *user
    }

    /// Whether `user` may change the task's progress, judged by the
    /// assignee column alone. Further assignees live in assignment records.
    #[must_use]
    pub fn can_update_progress(&self, user: &UserId) -> bool {
        self.is_owned_by(user) || self.assignee.as_ref() == Some(user)
    }

    /// Shallow-merges the columns present in `row` over this task.
    ///
    /// Absent columns are preserved. The identifier and creator are never
    /// rewritten by a merge.
    pub fn merge_row(&mut self, row: &TaskRow) {
        if let Some(title) = &row.title {
            self.title.clone_from(title);
        }
        if let Some(description) = &row.description {
            self.description.clone_from(description);
        }
        if let Some(progress) = row.progress {
            self.progress = progress;
        }
        if let Some(assignee) = &row.assignee {
            self.assignee.clone_from(assignee);
        }
        if let Some(created_at) = row.created_at {
            self.created_at = created_at;
        }
        if let Some(priority) = row.priority {
            self.priority = priority;
        }
    }
}

/// Errors converting a feed row into a complete [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    /// The row carries no identifier.
    #[error("row has no id")]
    MissingId,
    /// A required column is absent.
    #[error("row is missing required column `{0}`")]
    MissingColumn(&'static str),
}

/// A possibly partial task row as delivered by the change feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRow {
    /// Row identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description, or `Some(None)` to clear it.
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    /// New progress.
    #[serde(
        default,
        rename = "progress_perc",
        skip_serializing_if = "Option::is_none"
    )]
    pub progress: Option<Progress>,
    /// New assignee, or `Some(None)` to unassign.
    #[serde(
        default,
        rename = "assigned_to_user",
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub assignee: Option<Option<UserId>>,
    /// Creator.
    #[serde(
        default,
        rename = "user_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_by: Option<UserId>,
    /// Creation time in milliseconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    /// New priority, or `Some(None)` to clear it.
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<Option<Priority>>,
}

impl TaskRow {
    /// A row carrying only an identifier, as sent for deletes.
    #[must_use]
    pub fn key(id: TaskId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }
}

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        Self {
            id: Some(task.id),
            title: Some(task.title.clone()),
            description: Some(task.description.clone()),
            progress: Some(task.progress),
            assignee: Some(task.assignee.clone()),
            created_by: Some(task.created_by.clone()),
            created_at: Some(task.created_at),
            priority: Some(task.priority),
        }
    }
}

impl TryFrom<&TaskRow> for Task {
    type Error = RowError;

    fn try_from(row: &TaskRow) -> Result<Self, Self::Error> {
        let id = row.id.ok_or(RowError::MissingId)?;
        let title = row.title.clone().ok_or(RowError::MissingColumn("title"))?;
        let created_by = row
            .created_by
            .clone()
            .ok_or(RowError::MissingColumn("user_id"))?;
        Ok(Self {
            id,
            title,
            description: row.description.clone().flatten(),
            progress: row.progress.unwrap_or_default(),
            assignee: row.assignee.clone().flatten(),
            created_by,
            created_at: row.created_at.unwrap_or_default(),
            priority: row.priority.flatten(),
        })
    }
}

/// Columns supplied by the client when creating a task.
///
/// The backend assigns the identifier, creator, and creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    /// Trimmed, validated title.
    pub title: String,
    /// Optional detail.
    pub description: Option<String>,
    /// Primary assignee.
    pub assignee: Option<UserId>,
    /// Optional urgency label.
    pub priority: Option<Priority>,
}

/// Deserializes a present column (including `null`) as `Some(..)`, so that
/// `#[serde(default)]` alone yields `None` for an absent column.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
