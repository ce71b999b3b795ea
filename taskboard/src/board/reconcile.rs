//! Pure reconciliation of change-feed events into a task collection.
//!
//! The collection is ordered newest first. Every function here is a
//! synchronous reducer over the previous collection and never fails:
//! malformed events are logged and skipped so a corrupt payload cannot
//! break the live subscription.
//!
//! Rules:
//! - Insert: replace in place if the identifier exists, otherwise prepend.
//! - Update: shallow-merge present columns; unknown identifier is dropped.
//! - Delete: remove by identifier; unknown identifier is a no-op.
//!
//! Insert is an upsert so that a locally applied write acknowledgment and
//! the corresponding feed event collapse to one entity in either order.

use taskboard_proto::change::{ChangeEvent, ChangeKind};
use taskboard_proto::task::{RowError, Task, TaskId, TaskRow};

/// Outcome of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A new task was prepended.
    Inserted,
    /// An existing task was replaced by an insert.
    Replaced,
    /// An existing task was merged with an update.
    Updated,
    /// A task was removed.
    Removed,
    /// Nothing changed.
    Ignored(Skip),
}

impl Applied {
    /// Whether the collection changed.
    #[must_use]
    pub const fn changed(self) -> bool {
        !matches!(self, Self::Ignored(_))
    }
}

/// Why an event left the collection untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// Event carries no row identifier.
    MissingId,
    /// Insert row lacks a required column.
    Incomplete(&'static str),
    /// Event carries no row in the expected slot.
    MissingRow,
    /// Update or delete for an identifier not in the collection.
    UnknownTask,
    /// Payload could not be decoded.
    Undecodable,
    /// The board has been torn down.
    Closed,
}

/// Applies one change event to `tasks`.
pub fn apply_change(tasks: &mut Vec<Task>, event: &ChangeEvent<TaskRow>) -> Applied {
    let applied = match event.kind {
        ChangeKind::Insert => apply_insert(tasks, event.new.as_ref()),
        ChangeKind::Update => apply_update(tasks, event.new.as_ref()),
        ChangeKind::Delete => apply_delete(tasks, event),
    };
    match applied {
        Applied::Ignored(Skip::UnknownTask) => {
            tracing::debug!(kind = %event.kind, "change for unknown task dropped");
        }
        Applied::Ignored(reason) => {
            tracing::warn!(kind = %event.kind, ?reason, "malformed change ignored");
        }
        _ => tracing::trace!(kind = %event.kind, ?applied, "change applied"),
    }
    applied
}

/// Applies events in arrival order, returning how many changed the collection.
pub fn apply_all<'a>(
    tasks: &mut Vec<Task>,
    events: impl IntoIterator<Item = &'a ChangeEvent<TaskRow>>,
) -> usize {
    events
        .into_iter()
        .filter(|event| apply_change(tasks, event).changed())
        .count()
}

/// Inserts `task`, replacing any entity with the same identifier.
pub fn upsert(tasks: &mut Vec<Task>, task: Task) -> Applied {
    if let Some(existing) = tasks.iter_mut().find(|t| t.id == task.id) {
        *existing = task;
        Applied::Replaced
    } else {
        tasks.insert(0, task);
        Applied::Inserted
    }
}

/// Removes the task with `id`, returning whether one was present.
pub fn remove(tasks: &mut Vec<Task>, id: TaskId) -> bool {
    let before = tasks.len();
    tasks.retain(|t| t.id != id);
    tasks.len() != before
}

fn apply_insert(tasks: &mut Vec<Task>, row: Option<&TaskRow>) -> Applied {
    let Some(row) = row else {
        return Applied::Ignored(Skip::MissingRow);
    };
    match Task::try_from(row) {
        Ok(task) => upsert(tasks, task),
        Err(RowError::MissingId) => Applied::Ignored(Skip::MissingId),
        Err(RowError::MissingColumn(column)) => Applied::Ignored(Skip::Incomplete(column)),
    }
}

fn apply_update(tasks: &mut [Task], row: Option<&TaskRow>) -> Applied {
    let Some(row) = row else {
        return Applied::Ignored(Skip::MissingRow);
    };
    let Some(id) = row.id else {
        return Applied::Ignored(Skip::MissingId);
    };
    match tasks.iter_mut().find(|t| t.id == id) {
        Some(task) => {
            task.merge_row(row);
            Applied::Updated
        }
        None => Applied::Ignored(Skip::UnknownTask),
    }
}

fn apply_delete(tasks: &mut Vec<Task>, event: &ChangeEvent<TaskRow>) -> Applied {
    let id = event
        .old
        .as_ref()
        .and_then(|row| row.id)
        .or_else(|| event.new.as_ref().and_then(|row| row.id));
    let Some(id) = id else {
        return Applied::Ignored(Skip::MissingId);
    };
    if remove(tasks, id) {
        Applied::Removed
    } else {
        Applied::Ignored(Skip::UnknownTask)
    }
}
