//! In-memory backend.
//!
//! Holds every collection behind a single [`parking_lot::Mutex`] and fans
//! row changes out through [`tokio::sync::broadcast`] channels, one per
//! collection plus one for presence snapshots. Row ownership is enforced on
//! every write the same way the hosted store's row-level policies did:
//! only a task's creator edits or deletes it, any of its assignees may
//! move its progress, and only an assignment's user may update that
//! assignment.
//!
//! Fault injection hooks ([`fail_next`](InMemoryBackend::fail_next),
//! [`fail_assignments`](InMemoryBackend::fail_assignments),
//! [`fail_notifications_for`](InMemoryBackend::fail_notifications_for)) let
//! tests exercise transient failures.

use std::collections::{BTreeMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::broadcast;

use taskboard_proto::assignment::{Assignment, AssignmentId};
use taskboard_proto::change::ChangeEvent;
use taskboard_proto::notification::{NewNotification, Notification, NotificationId};
use taskboard_proto::presence::{PresenceMeta, PresenceSnapshot};
use taskboard_proto::profile::{Profile, UserId};
use taskboard_proto::task::{NewTask, Progress, Task, TaskId, TaskRow};

use super::{Backend, BackendError, ClientId, Subscription};

/// Default capacity of each broadcast feed.
pub const DEFAULT_FEED_CAPACITY: usize = 256;

/// Row storage.
#[derive(Default)]
struct Tables {
    /// Tasks in insertion order.
    tasks: Vec<Task>,
    assignments: Vec<Assignment>,
    notifications: Vec<Notification>,
    profiles: BTreeMap<UserId, Profile>,
    /// Joined presence clients; `None` meta until the client tracks.
    presence: BTreeMap<ClientId, (UserId, Option<PresenceMeta>)>,
    next_client: u64,
    /// Last issued timestamp, kept strictly increasing.
    last_timestamp: u64,
}

impl Tables {
    fn now_ms(&mut self) -> u64 {
        let wall = u64::try_from(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
        )
        .unwrap_or(u64::MAX);
        self.last_timestamp = wall.max(self.last_timestamp.saturating_add(1));
        self.last_timestamp
    }

    fn has_assignment(&self, task_id: TaskId, user: &UserId) -> bool {
        self.assignments
            .iter()
            .any(|a| a.task_id == task_id && a.user_id == *user)
    }

    fn task_mut(&mut self, id: TaskId) -> Result<&mut Task, BackendError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| BackendError::NotFound(format!("task {id}")))
    }

    fn presence_snapshot(&self) -> PresenceSnapshot {
        PresenceSnapshot::from_members(
            self.presence
                .values()
                .filter_map(|(key, meta)| meta.clone().map(|m| (key.clone(), m))),
        )
    }
}

/// Injected failures.
#[derive(Default)]
struct Faults {
    /// Number of upcoming async calls that fail with `Unavailable`.
    fail_next: u32,
    /// Recipients whose notification inserts fail.
    notification_failures: HashSet<UserId>,
    /// Whether assignment inserts fail.
    assignment_failures: bool,
}

/// In-process backend owning its own change feeds and presence channel.
pub struct InMemoryBackend {
    tables: Mutex<Tables>,
    faults: Mutex<Faults>,
    tasks_feed: broadcast::Sender<ChangeEvent<TaskRow>>,
    assignments_feed: broadcast::Sender<ChangeEvent<Assignment>>,
    notifications_feed: broadcast::Sender<ChangeEvent<Notification>>,
    presence_feed: broadcast::Sender<PresenceSnapshot>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// Creates an empty backend with the default feed capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_feed_capacity(DEFAULT_FEED_CAPACITY)
    }

    /// Creates an empty backend whose feeds buffer `capacity` events per
    /// subscriber before lagging.
    #[must_use]
    pub fn with_feed_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tasks_feed, _) = broadcast::channel(capacity);
        let (assignments_feed, _) = broadcast::channel(capacity);
        let (notifications_feed, _) = broadcast::channel(capacity);
        let (presence_feed, _) = broadcast::channel(capacity);
        Self {
            tables: Mutex::new(Tables::default()),
            faults: Mutex::new(Faults::default()),
            tasks_feed,
            assignments_feed,
            notifications_feed,
            presence_feed,
        }
    }

    /// Makes the next `calls` async operations fail with
    /// [`BackendError::Unavailable`].
    pub fn fail_next(&self, calls: u32) {
        self.faults.lock().fail_next = calls;
    }

    /// Makes every notification insert addressed to `user` fail.
    pub fn fail_notifications_for(&self, user: &UserId) {
        self.faults
            .lock()
            .notification_failures
            .insert(user.clone());
    }

    /// Makes every assignment insert fail while `fail` is set.
    pub fn fail_assignments(&self, fail: bool) {
        self.faults.lock().assignment_failures = fail;
    }

    /// Number of live task feed subscribers.
    #[must_use]
    pub fn task_subscriber_count(&self) -> usize {
        self.tasks_feed.receiver_count()
    }

    /// Number of live assignment feed subscribers.
    #[must_use]
    pub fn assignment_subscriber_count(&self) -> usize {
        self.assignments_feed.receiver_count()
    }

    /// Number of live notification feed subscribers.
    #[must_use]
    pub fn notification_subscriber_count(&self) -> usize {
        self.notifications_feed.receiver_count()
    }

    /// Number of live presence snapshot subscribers.
    #[must_use]
    pub fn presence_subscriber_count(&self) -> usize {
        self.presence_feed.receiver_count()
    }

    /// Current presence membership.
    #[must_use]
    pub fn presence_snapshot(&self) -> PresenceSnapshot {
        self.tables.lock().presence_snapshot()
    }

    /// All notifications ever created, oldest first.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.tables.lock().notifications.clone()
    }

    /// Publishes a raw task change without touching storage.
    ///
    /// Used to replay or forge feed traffic in tests.
    pub fn publish_task_change(&self, event: ChangeEvent<TaskRow>) {
        publish(&self.tasks_feed, "tasks", event);
    }

    fn check_fault(&self) -> Result<(), BackendError> {
        let mut faults = self.faults.lock();
        if faults.fail_next > 0 {
            faults.fail_next -= 1;
            return Err(BackendError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn broadcast_presence(&self, tables: &Tables) {
        publish(&self.presence_feed, "presence", tables.presence_snapshot());
    }
}

/// Sends on a feed. Having no subscribers is normal.
fn publish<T>(feed: &broadcast::Sender<T>, topic: &'static str, event: T) {
    if feed.send(event).is_err() {
        tracing::trace!(topic, "no subscribers for change");
    }
}

fn validate_patch(task: &Task, patch: &TaskRow) -> Result<(), BackendError> {
    if patch.id.is_some_and(|id| id != task.id) {
        return Err(BackendError::Invalid("patch id does not match".to_string()));
    }
    if patch.created_by.is_some() || patch.created_at.is_some() {
        return Err(BackendError::Invalid(
            "creator and creation time are immutable".to_string(),
        ));
    }
    if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(BackendError::Invalid("title cannot be empty".to_string()));
    }
    Ok(())
}

/// Whether `patch` touches anything besides progress.
const fn touches_owner_columns(patch: &TaskRow) -> bool {
    patch.title.is_some()
        || patch.description.is_some()
        || patch.assignee.is_some()
        || patch.priority.is_some()
}

impl Backend for InMemoryBackend {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, BackendError> {
        self.check_fault()?;
        Ok(self.tables.lock().tasks.clone())
    }

    async fn insert_task(&self, actor: &UserId, task: NewTask) -> Result<Task, BackendError> {
        self.check_fault()?;
        if task.title.trim().is_empty() {
            return Err(BackendError::Invalid("title cannot be empty".to_string()));
        }
        let mut tables = self.tables.lock();
        let created_at = tables.now_ms();
        let stored = Task {
            id: TaskId::new(),
            title: task.title,
            description: task.description,
            progress: Progress::ZERO,
            assignee: task.assignee,
            created_by: actor.clone(),
            created_at,
            priority: task.priority,
        };
        tables.tasks.push(stored.clone());
        drop(tables);

        tracing::debug!(task = %stored.id, actor = %actor, "task inserted");
        publish(
            &self.tasks_feed,
            "tasks",
            ChangeEvent::insert(TaskRow::from(&stored)),
        );
        Ok(stored)
    }

    async fn update_task(
        &self,
        actor: &UserId,
        id: TaskId,
        patch: TaskRow,
    ) -> Result<Task, BackendError> {
        self.check_fault()?;
        let mut tables = self.tables.lock();
        let recorded_assignee = tables.has_assignment(id, actor);
        let task = tables.task_mut(id)?;
        validate_patch(task, &patch)?;

        let allowed = if touches_owner_columns(&patch) {
            task.is_owned_by(actor)
        } else {
            task.can_update_progress(actor) || recorded_assignee
        };
        if !allowed {
            return Err(BackendError::PermissionDenied(format!(
                "{actor} may not modify task {id}"
            )));
        }

        task.merge_row(&patch);
        let stored = task.clone();
        drop(tables);

        publish(
            &self.tasks_feed,
            "tasks",
            ChangeEvent::update(TaskRow::from(&stored)),
        );
        Ok(stored)
    }

    async fn delete_task(&self, actor: &UserId, id: TaskId) -> Result<(), BackendError> {
        self.check_fault()?;
        let mut tables = self.tables.lock();
        if !tables.task_mut(id)?.is_owned_by(actor) {
            return Err(BackendError::PermissionDenied(format!(
                "{actor} may not delete task {id}"
            )));
        }
        tables.tasks.retain(|t| t.id != id);
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut tables.assignments)
            .into_iter()
            .partition(|a| a.task_id == id);
        tables.assignments = kept;
        drop(tables);

        tracing::debug!(
            task = %id,
            assignments = removed.len(),
            "task deleted with its assignments"
        );
        for assignment in removed {
            publish(
                &self.assignments_feed,
                "assignments",
                ChangeEvent::delete(assignment),
            );
        }
        publish(&self.tasks_feed, "tasks", ChangeEvent::delete(TaskRow::key(id)));
        Ok(())
    }

    async fn insert_assignments(
        &self,
        actor: &UserId,
        task_id: TaskId,
        users: &[UserId],
    ) -> Result<Vec<Assignment>, BackendError> {
        self.check_fault()?;
        if self.faults.lock().assignment_failures {
            return Err(BackendError::Unavailable(
                "assignment store rejected write".to_string(),
            ));
        }
        let mut tables = self.tables.lock();
        if !tables.task_mut(task_id)?.is_owned_by(actor) {
            return Err(BackendError::PermissionDenied(format!(
                "{actor} may not assign task {task_id}"
            )));
        }

        let mut created = Vec::with_capacity(users.len());
        for user in users {
            let exists = tables
                .assignments
                .iter()
                .any(|a| a.task_id == task_id && a.user_id == *user);
            if exists {
                continue;
            }
            let assignment = Assignment::new(task_id, user.clone());
            tables.assignments.push(assignment.clone());
            created.push(assignment);
        }
        drop(tables);

        for assignment in &created {
            publish(
                &self.assignments_feed,
                "assignments",
                ChangeEvent::insert(assignment.clone()),
            );
        }
        Ok(created)
    }

    async fn update_assignment_progress(
        &self,
        actor: &UserId,
        id: AssignmentId,
        progress: Progress,
    ) -> Result<Assignment, BackendError> {
        self.check_fault()?;
        let mut tables = self.tables.lock();
        let assignment = tables
            .assignments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| BackendError::NotFound(format!("assignment {id}")))?;
        if assignment.user_id != *actor {
            return Err(BackendError::PermissionDenied(format!(
                "{actor} is not the assignee of {id}"
            )));
        }
        assignment.progress = progress;
        let stored = assignment.clone();
        drop(tables);

        publish(
            &self.assignments_feed,
            "assignments",
            ChangeEvent::update(stored.clone()),
        );
        Ok(stored)
    }

    async fn fetch_assignments(&self, task_id: TaskId) -> Result<Vec<Assignment>, BackendError> {
        self.check_fault()?;
        Ok(self
            .tables
            .lock()
            .assignments
            .iter()
            .filter(|a| a.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn fetch_all_assignments(&self) -> Result<Vec<Assignment>, BackendError> {
        self.check_fault()?;
        Ok(self.tables.lock().assignments.clone())
    }

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, BackendError> {
        self.check_fault()?;
        if self
            .faults
            .lock()
            .notification_failures
            .contains(&notification.user_id)
        {
            return Err(BackendError::Unavailable(format!(
                "notification store rejected write for {}",
                notification.user_id
            )));
        }

        let mut tables = self.tables.lock();
        let created_at = tables.now_ms();
        let stored = Notification {
            id: NotificationId::new(),
            user_id: notification.user_id,
            message: notification.message,
            related_task: notification.related_task,
            read: false,
            created_at,
        };
        tables.notifications.push(stored.clone());
        drop(tables);

        publish(
            &self.notifications_feed,
            "notifications",
            ChangeEvent::insert(stored.clone()),
        );
        Ok(stored)
    }

    async fn fetch_unread_notifications(
        &self,
        user: &UserId,
    ) -> Result<Vec<Notification>, BackendError> {
        self.check_fault()?;
        let mut unread: Vec<Notification> = self
            .tables
            .lock()
            .notifications
            .iter()
            .filter(|n| n.user_id == *user && !n.read)
            .cloned()
            .collect();
        unread.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(unread)
    }

    async fn mark_notifications_read(
        &self,
        actor: &UserId,
        ids: &[NotificationId],
    ) -> Result<(), BackendError> {
        self.check_fault()?;
        let mut tables = self.tables.lock();
        let foreign = tables
            .notifications
            .iter()
            .any(|n| ids.contains(&n.id) && n.user_id != *actor);
        if foreign {
            return Err(BackendError::PermissionDenied(format!(
                "{actor} may only mark own notifications"
            )));
        }

        let mut changed = Vec::new();
        for n in &mut tables.notifications {
            if ids.contains(&n.id) && !n.read {
                n.read = true;
                changed.push(n.clone());
            }
        }
        drop(tables);

        for n in changed {
            publish(
                &self.notifications_feed,
                "notifications",
                ChangeEvent::update(n),
            );
        }
        Ok(())
    }

    async fn fetch_profiles(&self) -> Result<Vec<Profile>, BackendError> {
        self.check_fault()?;
        Ok(self.tables.lock().profiles.values().cloned().collect())
    }

    async fn upsert_profile(
        &self,
        actor: &UserId,
        display_name: &str,
    ) -> Result<Profile, BackendError> {
        self.check_fault()?;
        let name = display_name.trim();
        if name.is_empty() {
            return Err(BackendError::Invalid(
                "display name cannot be empty".to_string(),
            ));
        }
        let profile = Profile::new(actor.clone(), name);
        self.tables
            .lock()
            .profiles
            .insert(actor.clone(), profile.clone());
        Ok(profile)
    }

    fn subscribe_tasks(&self) -> Subscription<ChangeEvent<TaskRow>> {
        Subscription::new("tasks", self.tasks_feed.subscribe())
    }

    fn subscribe_assignments(&self) -> Subscription<ChangeEvent<Assignment>> {
        Subscription::new("assignments", self.assignments_feed.subscribe())
    }

    fn subscribe_notifications(&self) -> Subscription<ChangeEvent<Notification>> {
        Subscription::new("notifications", self.notifications_feed.subscribe())
    }

    fn subscribe_presence(&self) -> Subscription<PresenceSnapshot> {
        Subscription::new("presence", self.presence_feed.subscribe())
    }

    fn join_presence(&self, key: &UserId) -> ClientId {
        let mut tables = self.tables.lock();
        tables.next_client += 1;
        let client = ClientId::new(tables.next_client);
        tables.presence.insert(client, (key.clone(), None));
        // Sync the current membership to the newcomer.
        self.broadcast_presence(&tables);
        client
    }

    async fn track_presence(&self, client: ClientId, meta: PresenceMeta) -> Result<(), BackendError> {
        self.check_fault()?;
        let mut tables = self.tables.lock();
        let entry = tables
            .presence
            .get_mut(&client)
            .ok_or_else(|| BackendError::NotFound(format!("presence client {client:?}")))?;
        entry.1 = Some(meta);
        self.broadcast_presence(&tables);
        Ok(())
    }

    fn leave_presence(&self, client: ClientId) {
        let mut tables = self.tables.lock();
        if let Some((_, meta)) = tables.presence.remove(&client)
            && meta.is_some()
        {
            self.broadcast_presence(&tables);
        }
    }
}
