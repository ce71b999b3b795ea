//! Integration tests for presence over the profile directory.
//!
//! Joins several clients to one `InMemoryBackend` presence channel and
//! checks the online flags each tracker derives from the snapshots.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use taskboard::backend::memory::InMemoryBackend;
use taskboard::backend::{Backend, Delivery, PresenceChannel};
use taskboard::presence::PresenceTracker;
use taskboard_proto::presence::{PresenceMeta, PresenceStatus};
use taskboard_proto::profile::{ANONYMOUS_NAME, Profile, UNKNOWN_USER_NAME, UserId};

fn user(id: &str) -> UserId {
    UserId::from(id)
}

fn meta(id: &str, name: &str) -> PresenceMeta {
    PresenceMeta {
        user_id: user(id),
        display_name: name.to_string(),
    }
}

async fn seeded_backend() -> Arc<InMemoryBackend> {
    let backend = Arc::new(InMemoryBackend::new());
    for (id, name) in [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")] {
        backend.upsert_profile(&user(id), name).await.unwrap();
    }
    backend
}

/// Applies every pending snapshot on `channel` to `tracker`.
fn drain(tracker: &mut PresenceTracker, channel: &mut PresenceChannel<InMemoryBackend>) {
    while let Some(delivery) = channel.snapshots().try_next() {
        if let Delivery::Event(snapshot) = delivery {
            tracker.apply_snapshot(&snapshot);
        }
    }
}

#[tokio::test]
async fn joins_and_leaves_flip_flags() {
    let backend = seeded_backend().await;
    let mut tracker = PresenceTracker::new();
    tracker.load_directory(backend.fetch_profiles().await.unwrap());

    let mut alice = PresenceChannel::join(Arc::clone(&backend), user("alice"));
    assert!(tracker.announce(&mut alice, meta("alice", "Alice")).await);
    // Second announce on the same channel is a no-op.
    assert!(!tracker.announce(&mut alice, meta("alice", "Alice")).await);

    let mut bob = PresenceChannel::join(Arc::clone(&backend), user("bob"));
    tracker.announce(&mut bob, meta("bob", "Bob")).await;

    drain(&mut tracker, &mut alice);
    assert_eq!(tracker.status(&user("alice")), PresenceStatus::Online);
    assert_eq!(tracker.status(&user("bob")), PresenceStatus::Online);
    assert_eq!(tracker.status(&user("carol")), PresenceStatus::Offline);
    assert_eq!(tracker.online_count(), 2);

    drop(bob);
    drain(&mut tracker, &mut alice);
    assert_eq!(tracker.status(&user("bob")), PresenceStatus::Offline);
    assert_eq!(tracker.online_count(), 1);
}

#[tokio::test]
async fn joined_but_unannounced_client_is_offline() {
    let backend = seeded_backend().await;
    let mut tracker = PresenceTracker::new();
    tracker.load_directory(backend.fetch_profiles().await.unwrap());

    let mut alice = PresenceChannel::join(Arc::clone(&backend), user("alice"));
    tracker.announce(&mut alice, meta("alice", "Alice")).await;

    backend.fail_next(1);
    let mut carol = PresenceChannel::join(Arc::clone(&backend), user("carol"));
    assert!(!tracker.announce(&mut carol, meta("carol", "Carol")).await);
    assert!(!carol.has_left());

    drain(&mut tracker, &mut alice);
    assert_eq!(tracker.status(&user("carol")), PresenceStatus::Offline);

    // A retry on the same, still joined channel succeeds.
    assert!(tracker.announce(&mut carol, meta("carol", "Carol")).await);
    drain(&mut tracker, &mut alice);
    assert_eq!(tracker.status(&user("carol")), PresenceStatus::Online);
}

#[tokio::test]
async fn snapshots_before_directory_are_applied_on_load() {
    let backend = seeded_backend().await;
    let mut bob = PresenceChannel::join(Arc::clone(&backend), user("bob"));
    bob.announce(meta("bob", "Bob")).await.unwrap();

    let mut tracker = PresenceTracker::new();
    let mut watcher = PresenceChannel::join(Arc::clone(&backend), user("alice"));
    drain(&mut tracker, &mut watcher);
    assert_eq!(tracker.online_count(), 0);

    tracker.load_directory(backend.fetch_profiles().await.unwrap());
    assert_eq!(tracker.status(&user("bob")), PresenceStatus::Online);
    assert_eq!(tracker.status(&user("alice")), PresenceStatus::Offline);
}

#[tokio::test]
async fn teardown_releases_channel_and_freezes_flags() {
    let backend = seeded_backend().await;
    let mut tracker = PresenceTracker::new();
    tracker.load_directory(backend.fetch_profiles().await.unwrap());

    let mut alice = PresenceChannel::join(Arc::clone(&backend), user("alice"));
    tracker.announce(&mut alice, meta("alice", "Alice")).await;
    drain(&mut tracker, &mut alice);
    assert_eq!(backend.presence_subscriber_count(), 1);

    tracker.shutdown();
    alice.leave();
    alice.leave();
    assert_eq!(backend.presence_subscriber_count(), 0);
    assert!(backend.presence_snapshot().is_empty());

    let mut bob = PresenceChannel::join(Arc::clone(&backend), user("bob"));
    bob.announce(meta("bob", "Bob")).await.unwrap();
    assert!(!tracker.announce(&mut bob, meta("bob", "Bob")).await);
    drain(&mut tracker, &mut alice);
    assert_eq!(tracker.status(&user("alice")), PresenceStatus::Online);
    assert_eq!(tracker.status(&user("bob")), PresenceStatus::Offline);
}

#[test]
fn profile_names_resolve_with_placeholders() {
    let mut tracker = PresenceTracker::new();
    tracker.load_directory(vec![
        Profile::new("alice", "Alice"),
        Profile {
            id: user("nameless"),
            display_name: None,
        },
    ]);
    assert_eq!(tracker.profile(&user("alice")).display_name, "Alice");
    assert_eq!(tracker.profile(&user("nameless")).display_name, ANONYMOUS_NAME);
    assert_eq!(tracker.profile(&user("ghost")).display_name, UNKNOWN_USER_NAME);
}
