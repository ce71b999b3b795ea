//! Backend abstraction for `Taskboard`.
//!
//! Defines the [`Backend`] trait that every row store must satisfy: row-level
//! CRUD per collection, a change feed per collection, and a presence channel.
//! Concrete implementations include:
//! - [`memory::InMemoryBackend`]: in-process store that owns its own change
//!   feeds and presence channel
//!
//! Feeds are handed out as [`Subscription`] guards. Dropping a guard (or
//! calling [`Subscription::close`]) unsubscribes immediately.

pub mod memory;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;

use taskboard_proto::assignment::{Assignment, AssignmentId};
use taskboard_proto::change::ChangeEvent;
use taskboard_proto::notification::{NewNotification, Notification, NotificationId};
use taskboard_proto::presence::{PresenceMeta, PresenceSnapshot};
use taskboard_proto::profile::{Profile, UserId};
use taskboard_proto::task::{NewTask, Progress, Task, TaskId, TaskRow};

/// Errors returned by backend operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The acting user does not own the row.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The targeted row does not exist (possibly removed concurrently).
    #[error("not found: {0}")]
    NotFound(String),

    /// The service could not be reached or failed transiently.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The request was rejected as malformed.
    #[error("invalid request: {0}")]
    Invalid(String),
}

/// Identifies one client's membership in the presence channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    /// Wraps a raw client number.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Async row store with change feeds and a presence channel.
///
/// Write operations take the acting user explicitly; implementations enforce
/// row ownership and reject foreign writes with
/// [`BackendError::PermissionDenied`].
pub trait Backend: Send + Sync {
    /// All visible tasks, oldest first.
    fn fetch_tasks(&self) -> impl Future<Output = Result<Vec<Task>, BackendError>> + Send;

    /// Creates a task owned by `actor` and returns the stored row.
    fn insert_task(
        &self,
        actor: &UserId,
        task: NewTask,
    ) -> impl Future<Output = Result<Task, BackendError>> + Send;

    /// Applies the columns present in `patch` and returns the stored row.
    fn update_task(
        &self,
        actor: &UserId,
        id: TaskId,
        patch: TaskRow,
    ) -> impl Future<Output = Result<Task, BackendError>> + Send;

    /// Deletes a task and its assignments.
    fn delete_task(
        &self,
        actor: &UserId,
        id: TaskId,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Creates one assignment per user on a task owned by `actor`.
    fn insert_assignments(
        &self,
        actor: &UserId,
        task_id: TaskId,
        users: &[UserId],
    ) -> impl Future<Output = Result<Vec<Assignment>, BackendError>> + Send;

    /// Updates the assignee's own progress on an assignment.
    fn update_assignment_progress(
        &self,
        actor: &UserId,
        id: AssignmentId,
        progress: Progress,
    ) -> impl Future<Output = Result<Assignment, BackendError>> + Send;

    /// All assignments of a task.
    fn fetch_assignments(
        &self,
        task_id: TaskId,
    ) -> impl Future<Output = Result<Vec<Assignment>, BackendError>> + Send;

    /// Every assignment on the board.
    fn fetch_all_assignments(
        &self,
    ) -> impl Future<Output = Result<Vec<Assignment>, BackendError>> + Send;

    /// Creates a notification.
    fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> impl Future<Output = Result<Notification, BackendError>> + Send;

    /// Unread notifications addressed to `user`, newest first.
    fn fetch_unread_notifications(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<Vec<Notification>, BackendError>> + Send;

    /// Marks notifications owned by `actor` as read.
    fn mark_notifications_read(
        &self,
        actor: &UserId,
        ids: &[NotificationId],
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// The whole profile directory.
    fn fetch_profiles(&self) -> impl Future<Output = Result<Vec<Profile>, BackendError>> + Send;

    /// Creates or renames `actor`'s own profile.
    fn upsert_profile(
        &self,
        actor: &UserId,
        display_name: &str,
    ) -> impl Future<Output = Result<Profile, BackendError>> + Send;

    /// Subscribes to every change of the tasks collection.
    fn subscribe_tasks(&self) -> Subscription<ChangeEvent<TaskRow>>;

    /// Subscribes to every change of the assignments collection.
    fn subscribe_assignments(&self) -> Subscription<ChangeEvent<Assignment>>;

    /// Subscribes to every change of the notifications collection.
    fn subscribe_notifications(&self) -> Subscription<ChangeEvent<Notification>>;

    /// Subscribes to presence membership snapshots.
    fn subscribe_presence(&self) -> Subscription<PresenceSnapshot>;

    /// Joins the presence channel under `key` without announcing yet.
    fn join_presence(&self, key: &UserId) -> ClientId;

    /// Announces `meta` for a joined client.
    fn track_presence(
        &self,
        client: ClientId,
        meta: PresenceMeta,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Removes a client from the presence channel. Unknown clients are ignored.
    fn leave_presence(&self, client: ClientId);
}

/// One item pulled from a [`Subscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery<T> {
    /// The next event.
    Event(T),
    /// The subscriber fell behind and this many events were dropped.
    /// The consumer must resynchronise from a full fetch.
    Lagged(u64),
}

/// Scoped subscription to a broadcast feed.
///
/// Holding the guard keeps the subscription alive; dropping it or calling
/// [`close`](Self::close) releases it.
pub struct Subscription<T> {
    /// Feed name, for logs.
    topic: &'static str,
    /// `None` once closed.
    rx: Option<broadcast::Receiver<T>>,
}

impl<T> Subscription<T> {
    /// Wraps a broadcast receiver.
    #[must_use]
    pub const fn new(topic: &'static str, rx: broadcast::Receiver<T>) -> Self {
        Self {
            topic,
            rx: Some(rx),
        }
    }

    /// Feed name.
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        self.topic
    }

    /// Whether the subscription still receives events.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.rx.is_some()
    }

    /// Releases the subscription. Idempotent.
    pub fn close(&mut self) {
        if self.rx.take().is_some() {
            tracing::debug!(topic = self.topic, "subscription released");
        }
    }
}

impl<T: Clone> Subscription<T> {
    /// Returns the next pending item without waiting.
    ///
    /// Returns `None` when nothing is pending or the feed has closed.
    pub fn try_next(&mut self) -> Option<Delivery<T>> {
        let rx = self.rx.as_mut()?;
        match rx.try_recv() {
            Ok(event) => Some(Delivery::Event(event)),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Some(Delivery::Lagged(n)),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Closed) => {
                self.close();
                None
            }
        }
    }

    /// Waits for the next item.
    ///
    /// Returns `None` once the subscription is closed.
    pub async fn next(&mut self) -> Option<Delivery<T>> {
        let rx = self.rx.as_mut()?;
        match rx.recv().await {
            Ok(event) => Some(Delivery::Event(event)),
            Err(broadcast::error::RecvError::Lagged(n)) => Some(Delivery::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => {
                self.close();
                None
            }
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// A joined presence channel.
///
/// Own presence is announced at most once per channel lifetime. Leaving
/// (explicitly or on drop) removes this client from membership and releases
/// the snapshot subscription.
pub struct PresenceChannel<B: Backend> {
    backend: Arc<B>,
    key: UserId,
    client: ClientId,
    snapshots: Subscription<PresenceSnapshot>,
    announced: bool,
    left: bool,
}

impl<B: Backend> PresenceChannel<B> {
    /// Subscribes to snapshots, then joins under `key`.
    ///
    /// Subscribing first guarantees the snapshot triggered by the join is
    /// observed.
    #[must_use]
    pub fn join(backend: Arc<B>, key: UserId) -> Self {
        let snapshots = backend.subscribe_presence();
        let client = backend.join_presence(&key);
        tracing::debug!(key = %key, "joined presence channel");
        Self {
            backend,
            key,
            client,
            snapshots,
            announced: false,
            left: false,
        }
    }

    /// Presence key of this client.
    #[must_use]
    pub const fn key(&self) -> &UserId {
        &self.key
    }

    /// Whether own presence has been announced on this channel.
    #[must_use]
    pub const fn is_announced(&self) -> bool {
        self.announced
    }

    /// Whether the channel has been left.
    #[must_use]
    pub const fn has_left(&self) -> bool {
        self.left
    }

    /// Announces own presence.
    ///
    /// Returns `Ok(true)` if this call announced, `Ok(false)` if presence was
    /// already announced or the channel has been left.
    ///
    /// # Errors
    ///
    /// Propagates the backend error; the channel stays joined and a later
    /// call may retry.
    pub async fn announce(&mut self, meta: PresenceMeta) -> Result<bool, BackendError> {
        if self.announced || self.left {
            return Ok(false);
        }
        self.backend.track_presence(self.client, meta).await?;
        self.announced = true;
        Ok(true)
    }

    /// The snapshot feed.
    pub const fn snapshots(&mut self) -> &mut Subscription<PresenceSnapshot> {
        &mut self.snapshots
    }

    /// Leaves the channel. Idempotent.
    pub fn leave(&mut self) {
        if self.left {
            return;
        }
        self.left = true;
        self.snapshots.close();
        self.backend.leave_presence(self.client);
        tracing::debug!(key = %self.key, "left presence channel");
    }
}

impl<B: Backend> Drop for PresenceChannel<B> {
    fn drop(&mut self) {
        self.leave();
    }
}
