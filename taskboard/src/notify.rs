//! Assignment notifications.
//!
//! [`fan_out`] creates one notification per assignee when a task is
//! assigned. It is best-effort: each creation is independent, failures are
//! logged and reported, and nothing here undoes the task or its
//! assignments.
//!
//! [`NotificationInbox`] keeps the signed-in user's unread notifications
//! current from a fetch plus the notifications change feed.

use std::collections::HashSet;

use futures_util::future::join_all;

use taskboard_proto::change::{ChangeEvent, ChangeKind};
use taskboard_proto::notification::{NewNotification, Notification, assignment_message};
use taskboard_proto::profile::UserId;
use taskboard_proto::task::Task;

use crate::backend::{Backend, BackendError};

/// Result of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Notifications created.
    pub created: usize,
    /// Recipients whose notification failed, with the reason.
    pub failed: Vec<(UserId, BackendError)>,
}

impl FanOutReport {
    /// Whether every recipient was notified.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Notifies every recipient except `actor` that `task` was assigned to them.
///
/// Repeated recipients are notified once. Creations run concurrently; one
/// recipient's failure does not affect the others.
pub async fn fan_out<B: Backend>(
    backend: &B,
    actor: &UserId,
    task: &Task,
    recipients: &[UserId],
) -> FanOutReport {
    let mut seen = HashSet::new();
    let targets: Vec<&UserId> = recipients
        .iter()
        .filter(|user| *user != actor && seen.insert(*user))
        .collect();
    if targets.is_empty() {
        return FanOutReport::default();
    }

    let message = assignment_message(&task.title);
    let results = join_all(targets.iter().map(|user| {
        backend.insert_notification(NewNotification {
            user_id: (*user).clone(),
            message: message.clone(),
            related_task: Some(task.id),
        })
    }))
    .await;

    let mut report = FanOutReport::default();
    for (user, result) in targets.into_iter().zip(results) {
        match result {
            Ok(_) => report.created += 1,
            Err(e) => {
                tracing::warn!(task = %task.id, recipient = %user, error = %e, "failed to notify assignee");
                report.failed.push((user.clone(), e));
            }
        }
    }
    tracing::debug!(task = %task.id, created = report.created, failed = report.failed.len(), "assignment fan-out done");
    report
}

/// Unread notifications of one user, newest first.
#[derive(Debug, Clone)]
pub struct NotificationInbox {
    owner: UserId,
    unread: Vec<Notification>,
}

impl NotificationInbox {
    /// Creates an empty inbox for `owner`.
    #[must_use]
    pub const fn new(owner: UserId) -> Self {
        Self {
            owner,
            unread: Vec::new(),
        }
    }

    /// Owner of the inbox.
    #[must_use]
    pub const fn owner(&self) -> &UserId {
        &self.owner
    }

    /// Replaces the inbox with a fresh fetch.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the inbox is left unchanged.
    pub async fn refresh<B: Backend>(&mut self, backend: &B) -> Result<usize, BackendError> {
        let mut unread = backend.fetch_unread_notifications(&self.owner).await?;
        unread.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.unread = unread;
        Ok(self.unread.len())
    }

    /// Folds one feed event in. Returns whether the inbox changed.
    ///
    /// Events for other users are ignored, as are repeated inserts.
    pub fn on_change(&mut self, event: &ChangeEvent<Notification>) -> bool {
        let row = match event.kind {
            ChangeKind::Insert | ChangeKind::Update => event.new.as_ref(),
            ChangeKind::Delete => event.old.as_ref(),
        };
        let Some(row) = row else {
            return false;
        };
        if row.user_id != self.owner {
            return false;
        }

        let position = self.unread.iter().position(|n| n.id == row.id);
        match (event.kind, position) {
            (ChangeKind::Insert | ChangeKind::Update, None) if !row.read => {
                let at = self
                    .unread
                    .iter()
                    .position(|n| n.created_at < row.created_at)
                    .unwrap_or(self.unread.len());
                self.unread.insert(at, row.clone());
                true
            }
            (ChangeKind::Update, Some(i)) if row.read => {
                self.unread.remove(i);
                true
            }
            (ChangeKind::Delete, Some(i)) => {
                self.unread.remove(i);
                true
            }
            _ => false,
        }
    }

    /// Number of unread notifications.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.unread.len()
    }

    /// The unread notifications, newest first.
    #[must_use]
    pub fn notifications(&self) -> &[Notification] {
        &self.unread
    }

    /// Marks every loaded notification read and clears the inbox.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the inbox is left unchanged.
    pub async fn mark_all_read<B: Backend>(&mut self, backend: &B) -> Result<usize, BackendError> {
        if self.unread.is_empty() {
            return Ok(0);
        }
        let ids: Vec<_> = self.unread.iter().map(|n| n.id).collect();
        backend.mark_notifications_read(&self.owner, &ids).await?;
        self.unread.clear();
        tracing::debug!(owner = %self.owner, count = ids.len(), "notifications marked read");
        Ok(ids.len())
    }
}
