//! Task board for one session: reconciled collection plus user actions.
//!
//! `TaskBoard` owns the task collection exclusively. Feed events go through
//! [`apply_change`](TaskBoard::apply_change); write acknowledgments go
//! through [`upsert_local`](TaskBoard::upsert_local). Both paths use the
//! same upsert-by-identifier so they converge in either order.

use std::collections::HashSet;
use std::sync::Arc;

use taskboard_proto::assignment::{Assignment, AssignmentId};
use taskboard_proto::change::ChangeEvent;
use taskboard_proto::codec;
use taskboard_proto::profile::UserId;
use taskboard_proto::task::{
    MAX_TASK_TITLE_LENGTH, NewTask, Priority, Progress, Task, TaskId, TaskRow,
};

use super::assignees::AssigneeIndex;
use super::reconcile::{self, Applied, Skip};
use super::view::{self, StatusCounts, TaskFilter};
use super::{ActionError, TaskError, validate_title};
use crate::backend::{Backend, BackendError};
use crate::notify::{self, FanOutReport};

/// Input for [`TaskBoard::create_task`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    /// Title, trimmed before validation.
    pub title: String,
    /// Optional description; blank is treated as absent.
    pub description: Option<String>,
    /// Optional priority.
    pub priority: Option<Priority>,
    /// Users to assign. Each gets an assignment record; the first is also
    /// stored in the task's assignee column.
    pub assignees: Vec<UserId>,
}

/// Creator-only changes for [`TaskBoard::edit_task`].
///
/// `None` leaves a column untouched; `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskEdit {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<Option<String>>,
    /// New assignee.
    pub assignee: Option<Option<UserId>>,
    /// New priority.
    pub priority: Option<Option<Priority>>,
}

impl TaskEdit {
    const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.assignee.is_none()
            && self.priority.is_none()
    }
}

/// Outcome of [`TaskBoard::create_task`].
///
/// The task itself always succeeded; assignment and notification failures
/// are reported here and never undo it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTask {
    /// The stored task.
    pub task: Task,
    /// Assignments created for it.
    pub assignments: Vec<Assignment>,
    /// Why assignment creation failed, if it did.
    pub assignment_error: Option<BackendError>,
    /// Notification fan-out results.
    pub fan_out: FanOutReport,
}

/// Reconciled task collection for one session.
pub struct TaskBoard<B: Backend> {
    backend: Arc<B>,
    /// The acting user.
    me: UserId,
    /// Newest first.
    tasks: Vec<Task>,
    assignees: AssigneeIndex,
    max_title_len: usize,
    closed: bool,
}

impl<B: Backend> TaskBoard<B> {
    /// Fetches the initial task and assignment snapshots.
    ///
    /// # Errors
    ///
    /// Returns the backend error if either fetch fails.
    pub async fn load(backend: Arc<B>, me: UserId, max_title_len: usize) -> Result<Self, BackendError> {
        let tasks = backend.fetch_tasks().await?;
        let assignments = backend.fetch_all_assignments().await?;
        tracing::debug!(
            count = tasks.len(),
            assignments = assignments.len(),
            user = %me,
            "task snapshot loaded"
        );
        let mut board = Self::from_snapshot(backend, me, tasks, max_title_len);
        board.assignees = AssigneeIndex::from_assignments(&assignments);
        Ok(board)
    }

    /// Builds a board from an already fetched snapshot.
    #[must_use]
    pub fn from_snapshot(backend: Arc<B>, me: UserId, tasks: Vec<Task>, max_title_len: usize) -> Self {
        Self {
            backend,
            me,
            tasks: newest_first(tasks),
            assignees: AssigneeIndex::new(),
            max_title_len: max_title_len.clamp(1, MAX_TASK_TITLE_LENGTH),
            closed: false,
        }
    }

    /// The acting user.
    #[must_use]
    pub const fn me(&self) -> &UserId {
        &self.me
    }

    /// The collection, newest first.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Looks up a task by identifier.
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Who is assigned to which task.
    #[must_use]
    pub const fn assignees(&self) -> &AssigneeIndex {
        &self.assignees
    }

    /// Whether the acting user may move `task`'s progress.
    #[must_use]
    pub fn can_update_progress(&self, task: &Task) -> bool {
        self.assignees.may_update_progress(task, &self.me)
    }

    /// Tasks passing `filter`, newest first.
    #[must_use]
    pub fn view(&self, filter: &TaskFilter) -> Vec<&Task> {
        view::filter(&self.tasks, filter, &self.assignees)
    }

    /// Per-status counts for the acting user.
    #[must_use]
    pub fn counts(&self) -> StatusCounts {
        view::counts(&self.tasks, &self.me, &self.assignees)
    }

    /// Folds one feed event into the collection.
    pub fn apply_change(&mut self, event: &ChangeEvent<TaskRow>) -> Applied {
        if self.closed {
            return Applied::Ignored(Skip::Closed);
        }
        let applied = reconcile::apply_change(&mut self.tasks, event);
        if applied == Applied::Removed
            && let Some(id) = event
                .old
                .as_ref()
                .and_then(|row| row.id)
                .or_else(|| event.new.as_ref().and_then(|row| row.id))
        {
            self.assignees.remove_task(id);
        }
        applied
    }

    /// Folds one assignments-feed event into the assignee index.
    ///
    /// Returns whether the index changed.
    pub fn apply_assignment_change(&mut self, event: &ChangeEvent<Assignment>) -> bool {
        if self.closed {
            return false;
        }
        self.assignees.apply_change(event)
    }

    /// Decodes a raw JSON feed payload and folds it in.
    ///
    /// Undecodable payloads are logged and skipped.
    pub fn apply_raw(&mut self, payload: &[u8]) -> Applied {
        match codec::decode::<TaskRow>(payload) {
            Ok(event) => self.apply_change(&event),
            Err(e) => {
                tracing::warn!(error = %e, "undecodable task change ignored");
                Applied::Ignored(Skip::Undecodable)
            }
        }
    }

    /// Folds an acknowledged row into the collection.
    pub fn upsert_local(&mut self, task: Task) -> Applied {
        if self.closed {
            return Applied::Ignored(Skip::Closed);
        }
        reconcile::upsert(&mut self.tasks, task)
    }

    /// Replaces the collection with a fresh snapshot.
    ///
    /// Used after the feed lagged and events were lost.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the collection is left unchanged.
    pub async fn resync(&mut self) -> Result<usize, BackendError> {
        let tasks = self.backend.fetch_tasks().await?;
        let assignments = self.backend.fetch_all_assignments().await?;
        if self.closed {
            return Ok(0);
        }
        self.tasks = newest_first(tasks);
        self.assignees = AssigneeIndex::from_assignments(&assignments);
        tracing::info!(count = self.tasks.len(), "task board resynchronised");
        Ok(self.tasks.len())
    }

    /// Stops applying events and acknowledgments.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Whether the board has been closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Creates a task, its assignments and their notifications.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Validation`] for a bad title, or the backend
    /// failure of the task insert itself.
    pub async fn create_task(&mut self, draft: TaskDraft) -> Result<CreatedTask, ActionError> {
        self.ensure_open()?;
        let title = validate_title(&draft.title, self.max_title_len)?;
        let recipients = distinct(draft.assignees);

        let new_task = NewTask {
            title,
            description: draft.description.filter(|d| !d.trim().is_empty()),
            assignee: recipients.first().cloned(),
            priority: draft.priority,
        };
        let task = self.backend.insert_task(&self.me, new_task).await?;
        self.upsert_local(task.clone());
        tracing::info!(task = %task.id, assignees = recipients.len(), "task created");

        let (assignments, assignment_error) = if recipients.is_empty() {
            (Vec::new(), None)
        } else {
            match self
                .backend
                .insert_assignments(&self.me, task.id, &recipients)
                .await
            {
                Ok(assignments) => {
                    if !self.closed {
                        for assignment in &assignments {
                            self.assignees.insert(assignment);
                        }
                    }
                    (assignments, None)
                }
                Err(e) => {
                    tracing::warn!(task = %task.id, error = %e, "failed to create assignments");
                    (Vec::new(), Some(e))
                }
            }
        };

        let assigned: Vec<UserId> = assignments.iter().map(|a| a.user_id.clone()).collect();
        let fan_out = notify::fan_out(&*self.backend, &self.me, &task, &assigned).await;

        Ok(CreatedTask {
            task,
            assignments,
            assignment_error,
            fan_out,
        })
    }

    /// Applies creator-only changes to a task.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Permission`] if the acting user is not the
    /// creator, [`ActionError::NotFound`] for an unknown task, or the
    /// backend failure. Local state is unchanged on error.
    pub async fn edit_task(&mut self, id: TaskId, edit: TaskEdit) -> Result<Task, ActionError> {
        self.ensure_open()?;
        if !self.local(id)?.is_owned_by(&self.me) {
            return Err(ActionError::Permission(
                "only the creator can edit this task".to_string(),
            ));
        }
        if edit.is_empty() {
            return self.local(id).cloned();
        }

        let title = edit
            .title
            .as_deref()
            .map(|t| validate_title(t, self.max_title_len))
            .transpose()?;
        let patch = TaskRow {
            title,
            description: edit
                .description
                .map(|d| d.filter(|text| !text.trim().is_empty())),
            assignee: edit.assignee,
            priority: edit.priority,
            ..TaskRow::default()
        };
        let stored = self.backend.update_task(&self.me, id, patch).await?;
        self.upsert_local(stored.clone());
        tracing::debug!(task = %id, "task edited");
        Ok(stored)
    }

    /// Moves a task's progress, optimistically.
    ///
    /// The new value is shown immediately and rolled back if the backend
    /// rejects the write.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Validation`] for a value above 100,
    /// [`ActionError::Permission`] unless the acting user is the creator or
    /// one of the assignees, or the backend failure.
    pub async fn set_progress(&mut self, id: TaskId, percent: u8) -> Result<Task, ActionError> {
        self.ensure_open()?;
        let progress = Progress::new(percent).map_err(|_| TaskError::ProgressOutOfRange)?;
        let previous = {
            let task = self.local(id)?;
            if !self.can_update_progress(task) {
                return Err(ActionError::Permission(
                    "only the creator or assignee can update progress".to_string(),
                ));
            }
            task.progress
        };

        self.set_local_progress(id, progress);
        let patch = TaskRow {
            progress: Some(progress),
            ..TaskRow::default()
        };
        match self.backend.update_task(&self.me, id, patch).await {
            Ok(stored) => {
                self.upsert_local(stored.clone());
                Ok(stored)
            }
            Err(e) => {
                tracing::warn!(task = %id, error = %e, "progress update failed, rolling back");
                self.set_local_progress(id, previous);
                Err(e.into())
            }
        }
    }

    /// Deletes a task and, on the backend, its assignments.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Permission`] unless the acting user is the
    /// creator, or the backend failure.
    pub async fn delete_task(&mut self, id: TaskId) -> Result<(), ActionError> {
        self.ensure_open()?;
        if !self.local(id)?.is_owned_by(&self.me) {
            return Err(ActionError::Permission(
                "only the creator can delete this task".to_string(),
            ));
        }
        self.backend.delete_task(&self.me, id).await?;
        if !self.closed {
            reconcile::remove(&mut self.tasks, id);
            self.assignees.remove_task(id);
        }
        tracing::info!(task = %id, "task deleted");
        Ok(())
    }

    /// Updates the acting user's own progress report on an assignment.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Validation`] for a value above 100, or the
    /// backend failure (permission denied for someone else's assignment).
    pub async fn update_assignment_progress(
        &self,
        id: AssignmentId,
        percent: u8,
    ) -> Result<Assignment, ActionError> {
        self.ensure_open()?;
        let progress = Progress::new(percent).map_err(|_| TaskError::ProgressOutOfRange)?;
        Ok(self
            .backend
            .update_assignment_progress(&self.me, id, progress)
            .await?)
    }

    /// All assignments of a task.
    ///
    /// # Errors
    ///
    /// Returns the backend failure.
    pub async fn assignments(&self, task_id: TaskId) -> Result<Vec<Assignment>, ActionError> {
        self.ensure_open()?;
        Ok(self.backend.fetch_assignments(task_id).await?)
    }

    const fn ensure_open(&self) -> Result<(), ActionError> {
        if self.closed {
            Err(ActionError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn local(&self, id: TaskId) -> Result<&Task, ActionError> {
        self.task(id)
            .ok_or_else(|| ActionError::NotFound(format!("task {id}")))
    }

    fn set_local_progress(&mut self, id: TaskId, progress: Progress) {
        if self.closed {
            return;
        }
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            task.progress = progress;
        }
    }
}

/// Orders a fetched snapshot newest first.
fn newest_first(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
    tasks
}

/// Drops repeated users, keeping first occurrence order.
fn distinct(users: Vec<UserId>) -> Vec<UserId> {
    let mut seen = HashSet::new();
    users
        .into_iter()
        .filter(|u| seen.insert(u.clone()))
        .collect()
}
