//! The shared task board.
//!
//! Holds the locally reconciled task collection for one session. An initial
//! snapshot is fetched, then every change-feed event is folded in with
//! upsert-by-identifier semantics, so the local view converges regardless
//! of whether a write's acknowledgment or its change event arrives first.

pub mod assignees;
pub mod manager;
pub mod reconcile;
pub mod view;

pub use assignees::AssigneeIndex;
pub use manager::{CreatedTask, TaskBoard, TaskDraft, TaskEdit};
pub use reconcile::{Applied, Skip, apply_all, apply_change};
pub use view::{StatusCounts, TaskFilter, TaskRowView};

use thiserror::Error;

use crate::backend::BackendError;

/// Validation errors for task input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// Task title cannot be empty.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Task title exceeds the maximum length.
    #[error("task title too long (max {0} characters)")]
    TitleTooLong(usize),
    /// Progress must be within 0..=100.
    #[error("progress must be between 0 and 100")]
    ProgressOutOfRange,
}

/// Errors surfaced by board actions.
///
/// Every remote failure is caught at the action boundary and returned here;
/// nothing propagates into the feed-processing path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    /// Input rejected before any remote call.
    #[error("invalid input: {0}")]
    Validation(#[from] TaskError),
    /// The acting user does not own the task.
    #[error("permission denied: {0}")]
    Permission(String),
    /// The task or record no longer exists.
    #[error("not found: {0}")]
    NotFound(String),
    /// The backend failed for another reason.
    #[error("backend error: {0}")]
    Backend(BackendError),
    /// The session was torn down.
    #[error("session closed")]
    SessionClosed,
}

impl From<BackendError> for ActionError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::PermissionDenied(msg) => Self::Permission(msg),
            BackendError::NotFound(msg) => Self::NotFound(msg),
            other => Self::Backend(other),
        }
    }
}

impl ActionError {
    /// Text to show the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::Permission(msg) => format!("Permission denied: {msg}"),
            Self::NotFound(_) => "The operation failed: that item no longer exists.".to_string(),
            Self::Backend(e) => format!("The operation failed: {e}"),
            Self::SessionClosed => "You have been signed out.".to_string(),
        }
    }
}

/// Trims and validates a task title.
///
/// # Errors
///
/// Returns [`TaskError::TitleEmpty`] for a blank title or
/// [`TaskError::TitleTooLong`] if it exceeds `max_len` characters.
pub fn validate_title(title: &str, max_len: usize) -> Result<String, TaskError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(TaskError::TitleEmpty);
    }
    if trimmed.chars().count() > max_len {
        return Err(TaskError::TitleTooLong(max_len));
    }
    Ok(trimmed.to_string())
}
