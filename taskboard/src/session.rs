//! One signed-in user's live view of the board.
//!
//! A [`Session`] is constructed explicitly with [`Session::start`] and torn
//! down with [`Session::shutdown`] (or on drop). Feeds are subscribed before
//! the initial fetches so nothing committed in between is missed; the
//! duplicates this can produce are absorbed by upsert-by-identifier.
//!
//! Everything runs on the caller's task. [`pump`](Session::pump) drains
//! pending deliveries without waiting; [`process_next`](Session::process_next)
//! waits for the next one. A lagged task or assignment feed marks the board
//! for a full refetch, performed by
//! [`resync_if_needed`](Session::resync_if_needed).

use std::sync::Arc;

use taskboard_proto::assignment::Assignment;
use taskboard_proto::change::ChangeEvent;
use taskboard_proto::notification::Notification;
use taskboard_proto::presence::{PresenceMeta, PresenceSnapshot};
use taskboard_proto::profile::UserId;
use taskboard_proto::task::{Task, TaskRow};

use crate::backend::{Backend, BackendError, Delivery, PresenceChannel, Subscription};
use crate::board::view::{self, TaskRowView};
use crate::board::{TaskBoard, TaskFilter};
use crate::config::SessionConfig;
use crate::notify::NotificationInbox;
use crate::presence::PresenceTracker;

/// Deliveries applied by one [`Session::pump`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Task changes that altered the board.
    pub tasks: usize,
    /// Assignment changes that altered who is assigned.
    pub assignments: usize,
    /// Notification changes that altered the inbox.
    pub notifications: usize,
    /// Presence snapshots applied.
    pub snapshots: usize,
}

impl PumpStats {
    /// Whether anything was applied.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tasks == 0 && self.assignments == 0 && self.notifications == 0 && self.snapshots == 0
    }
}

enum Incoming {
    Task(Delivery<ChangeEvent<TaskRow>>),
    Assignment(Delivery<ChangeEvent<Assignment>>),
    Notification(Delivery<ChangeEvent<Notification>>),
    Presence(Delivery<PresenceSnapshot>),
}

/// A signed-in user's board, presence and inbox, kept live from the feeds.
pub struct Session<B: Backend> {
    backend: Arc<B>,
    user: UserId,
    display_name: String,
    board: TaskBoard<B>,
    presence: PresenceTracker,
    channel: Option<PresenceChannel<B>>,
    inbox: NotificationInbox,
    tasks_feed: Subscription<ChangeEvent<TaskRow>>,
    assignments_feed: Subscription<ChangeEvent<Assignment>>,
    notifications_feed: Subscription<ChangeEvent<Notification>>,
    filter: TaskFilter,
    /// Task or assignment events were lost; refetch before trusting the board.
    needs_resync: bool,
    /// Notification events were lost; refetch the inbox.
    needs_inbox_refresh: bool,
    shut_down: bool,
}

impl<B: Backend> Session<B> {
    /// Starts a session for `user`.
    ///
    /// Subscribes to the feeds, stores the configured display name, loads
    /// the board, the profile directory and the inbox, then joins the
    /// presence channel and announces once.
    ///
    /// # Errors
    ///
    /// Returns the backend error of any initial fetch. Failing to store the
    /// display name or to announce presence is logged and not fatal.
    pub async fn start(backend: Arc<B>, user: UserId, config: &SessionConfig) -> Result<Self, BackendError> {
        let tasks_feed = backend.subscribe_tasks();
        let assignments_feed = backend.subscribe_assignments();
        let notifications_feed = backend.subscribe_notifications();

        if let Some(name) = config.display_name.as_deref()
            && let Err(e) = backend.upsert_profile(&user, name).await
        {
            tracing::warn!(user = %user, error = %e, "failed to store display name");
        }

        let board = TaskBoard::load(Arc::clone(&backend), user.clone(), config.max_title_len).await?;
        let mut presence = PresenceTracker::new();
        presence.load_directory(backend.fetch_profiles().await?);
        let mut inbox = NotificationInbox::new(user.clone());
        inbox.refresh(&*backend).await?;

        let display_name = config.display_name.clone().unwrap_or_else(|| {
            if presence.knows(&user) {
                presence.profile(&user).display_name
            } else {
                user.to_string()
            }
        });

        let mut session = Self {
            filter: config.initial_filter(&user),
            backend,
            user,
            display_name,
            board,
            presence,
            channel: None,
            inbox,
            tasks_feed,
            assignments_feed,
            notifications_feed,
            needs_resync: false,
            needs_inbox_refresh: false,
            shut_down: false,
        };
        session.join_presence().await;
        session.pump();
        tracing::info!(user = %session.user, tasks = session.board.tasks().len(), "session started");
        Ok(session)
    }

    /// The signed-in user.
    #[must_use]
    pub const fn user(&self) -> &UserId {
        &self.user
    }

    /// Name announced on the presence channel.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The task board.
    #[must_use]
    pub const fn board(&self) -> &TaskBoard<B> {
        &self.board
    }

    /// The task board, for actions.
    pub const fn board_mut(&mut self) -> &mut TaskBoard<B> {
        &mut self.board
    }

    /// Presence over the profile directory.
    #[must_use]
    pub const fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Unread notifications.
    #[must_use]
    pub const fn inbox(&self) -> &NotificationInbox {
        &self.inbox
    }

    /// The active filter.
    #[must_use]
    pub const fn filter(&self) -> &TaskFilter {
        &self.filter
    }

    /// Switches the active filter.
    pub fn set_filter(&mut self, filter: TaskFilter) {
        self.filter = filter;
    }

    /// Tasks passing the active filter, newest first.
    #[must_use]
    pub fn visible_tasks(&self) -> Vec<&Task> {
        self.board.view(&self.filter)
    }

    /// Visible tasks sorted by priority and joined with live profiles.
    #[must_use]
    pub fn rows(&self) -> Vec<TaskRowView<'_>> {
        let mut tasks = self.visible_tasks();
        view::sort_by_priority(&mut tasks);
        view::join_profiles(&tasks, &self.presence, self.board.assignees(), &self.user)
    }

    /// Whether own presence is currently announced.
    #[must_use]
    pub fn is_announced(&self) -> bool {
        self.channel.as_ref().is_some_and(PresenceChannel::is_announced)
    }

    /// Whether the board awaits a full refetch.
    #[must_use]
    pub const fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    #[must_use]
    pub const fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Applies every pending delivery without waiting.
    pub fn pump(&mut self) -> PumpStats {
        let mut stats = PumpStats::default();
        if self.shut_down {
            return stats;
        }
        while let Some(delivery) = self.tasks_feed.try_next() {
            stats.tasks += usize::from(self.handle(Incoming::Task(delivery)));
        }
        while let Some(delivery) = self.assignments_feed.try_next() {
            stats.assignments += usize::from(self.handle(Incoming::Assignment(delivery)));
        }
        while let Some(delivery) = self.notifications_feed.try_next() {
            stats.notifications += usize::from(self.handle(Incoming::Notification(delivery)));
        }
        while let Some(delivery) = self.channel.as_mut().and_then(|c| c.snapshots().try_next()) {
            stats.snapshots += usize::from(self.handle(Incoming::Presence(delivery)));
        }
        stats
    }

    /// Waits for the next delivery on any feed and applies it.
    ///
    /// Returns `false` once every feed is closed or the session is shut
    /// down.
    pub async fn process_next(&mut self) -> bool {
        if self.shut_down {
            return false;
        }
        let incoming = {
            let Self {
                tasks_feed,
                assignments_feed,
                notifications_feed,
                channel,
                ..
            } = self;
            let tasks_open = tasks_feed.is_open();
            let assignments_open = assignments_feed.is_open();
            let notifications_open = notifications_feed.is_open();
            let presence_open = channel.as_ref().is_some_and(|c| !c.has_left());

            tokio::select! {
                Some(d) = tasks_feed.next(), if tasks_open => Incoming::Task(d),
                Some(d) = assignments_feed.next(), if assignments_open => Incoming::Assignment(d),
                Some(d) = notifications_feed.next(), if notifications_open => Incoming::Notification(d),
                Some(d) = next_snapshot(channel), if presence_open => Incoming::Presence(d),
                else => return false,
            }
        };
        self.handle(incoming);
        true
    }

    /// Refetches whatever lagged feeds invalidated.
    ///
    /// Returns whether a refetch ran.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the flag stays set so a later call
    /// retries.
    pub async fn resync_if_needed(&mut self) -> Result<bool, BackendError> {
        if self.shut_down || !(self.needs_resync || self.needs_inbox_refresh) {
            return Ok(false);
        }
        if self.needs_resync {
            self.board.resync().await?;
            self.needs_resync = false;
        }
        if self.needs_inbox_refresh {
            self.inbox.refresh(&*self.backend).await?;
            self.needs_inbox_refresh = false;
        }
        Ok(true)
    }

    /// Marks every unread notification read.
    ///
    /// Returns how many were marked. After shutdown nothing is written and
    /// the result is zero.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the inbox is left unchanged.
    pub async fn mark_notifications_read(&mut self) -> Result<usize, BackendError> {
        if self.shut_down {
            return Ok(0);
        }
        self.inbox.mark_all_read(&*self.backend).await
    }

    /// Leaves and rejoins the presence channel, announcing again.
    ///
    /// Used after an announce failed or the connection was re-established.
    pub async fn reconnect_presence(&mut self) {
        if self.shut_down {
            return;
        }
        if let Some(mut channel) = self.channel.take() {
            channel.leave();
        }
        self.join_presence().await;
        self.pump();
    }

    /// Tears the session down. Idempotent.
    ///
    /// Releases every subscription, leaves the presence channel and stops
    /// all further state mutation.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.tasks_feed.close();
        self.assignments_feed.close();
        self.notifications_feed.close();
        if let Some(mut channel) = self.channel.take() {
            channel.leave();
        }
        self.presence.shutdown();
        self.board.close();
        tracing::info!(user = %self.user, "session shut down");
    }

    async fn join_presence(&mut self) {
        let mut channel = PresenceChannel::join(Arc::clone(&self.backend), self.user.clone());
        let meta = PresenceMeta {
            user_id: self.user.clone(),
            display_name: self.display_name.clone(),
        };
        if !self.presence.announce(&mut channel, meta).await {
            tracing::debug!(user = %self.user, "presence not announced");
        }
        self.channel = Some(channel);
    }

    /// Applies one delivery. Returns whether state changed.
    fn handle(&mut self, incoming: Incoming) -> bool {
        match incoming {
            Incoming::Task(Delivery::Event(event)) => self.board.apply_change(&event).changed(),
            Incoming::Task(Delivery::Lagged(missed)) => {
                tracing::warn!(missed, "task feed lagged, resync scheduled");
                self.needs_resync = true;
                false
            }
            Incoming::Assignment(Delivery::Event(event)) => self.board.apply_assignment_change(&event),
            Incoming::Assignment(Delivery::Lagged(missed)) => {
                tracing::warn!(missed, "assignment feed lagged, resync scheduled");
                self.needs_resync = true;
                false
            }
            Incoming::Notification(Delivery::Event(event)) => self.inbox.on_change(&event),
            Incoming::Notification(Delivery::Lagged(missed)) => {
                tracing::warn!(missed, "notification feed lagged, refresh scheduled");
                self.needs_inbox_refresh = true;
                false
            }
            Incoming::Presence(Delivery::Event(snapshot)) => {
                self.presence.apply_snapshot(&snapshot);
                true
            }
            Incoming::Presence(Delivery::Lagged(missed)) => {
                // Snapshots are total; the next one supersedes the missed ones.
                tracing::debug!(missed, "presence feed lagged");
                false
            }
        }
    }
}

impl<B: Backend> Drop for Session<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn next_snapshot<B: Backend>(
    channel: &mut Option<PresenceChannel<B>>,
) -> Option<Delivery<PresenceSnapshot>> {
    match channel {
        Some(channel) => channel.snapshots().next().await,
        None => None,
    }
}

/// Holds at most one session and follows the signed-in user.
pub struct SessionSlot<B: Backend> {
    backend: Arc<B>,
    config: SessionConfig,
    session: Option<Session<B>>,
}

impl<B: Backend> SessionSlot<B> {
    /// Creates an empty slot.
    #[must_use]
    pub const fn new(backend: Arc<B>, config: SessionConfig) -> Self {
        Self {
            backend,
            config,
            session: None,
        }
    }

    /// The current session, if signed in.
    #[must_use]
    pub const fn session(&self) -> Option<&Session<B>> {
        self.session.as_ref()
    }

    /// The current session, mutably.
    pub const fn session_mut(&mut self) -> Option<&mut Session<B>> {
        self.session.as_mut()
    }

    /// Reconciles the slot with the signed-in user.
    ///
    /// Signing out or switching users shuts the previous session down
    /// before any new one starts. The same user again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the new session fails to start; the
    /// slot is then empty.
    pub async fn apply_auth(&mut self, user: Option<UserId>) -> Result<(), BackendError> {
        if self.session.as_ref().map(Session::user) == user.as_ref() {
            return Ok(());
        }
        if let Some(mut previous) = self.session.take() {
            previous.shutdown();
        }
        if let Some(user) = user {
            let session = Session::start(Arc::clone(&self.backend), user, &self.config).await?;
            self.session = Some(session);
        }
        Ok(())
    }
}
