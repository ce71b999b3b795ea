//! Integration tests for session start, live sync and teardown.
//!
//! Two sessions share one `InMemoryBackend`; each action by one user must
//! show up in the other's board, presence and inbox after a pump.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use taskboard::auth::Auth;
use taskboard::backend::Backend;
use taskboard::backend::memory::InMemoryBackend;
use taskboard::board::{ActionError, TaskDraft, TaskEdit, TaskFilter};
use taskboard::config::SessionConfig;
use taskboard::session::{Session, SessionSlot};
use taskboard_proto::presence::PresenceStatus;
use taskboard_proto::profile::UserId;
use taskboard_proto::task::Priority;

fn user(id: &str) -> UserId {
    UserId::from(id)
}

fn named(name: &str) -> SessionConfig {
    SessionConfig {
        display_name: Some(name.to_string()),
        ..SessionConfig::default()
    }
}

async fn start(backend: &Arc<InMemoryBackend>, id: &str, name: &str) -> Session<InMemoryBackend> {
    Session::start(Arc::clone(backend), user(id), &named(name))
        .await
        .unwrap()
}

#[tokio::test]
async fn sessions_see_each_other_and_each_others_changes() {
    let backend = Arc::new(InMemoryBackend::new());
    let mut alice = start(&backend, "alice", "Alice").await;
    let mut bob = start(&backend, "bob", "Bob").await;

    assert_eq!(bob.presence().status(&user("alice")), PresenceStatus::Online);
    assert_eq!(bob.presence().online_count(), 2);

    let created = alice
        .board_mut()
        .create_task(TaskDraft {
            title: "Review PR".to_string(),
            priority: Some(Priority::High),
            assignees: vec![user("bob")],
            ..TaskDraft::default()
        })
        .await
        .unwrap();

    let stats = bob.pump();
    assert_eq!(stats.tasks, 1);
    assert_eq!(stats.notifications, 1);
    assert_eq!(bob.inbox().unread_count(), 1);

    bob.set_filter(TaskFilter::AssignedTo(user("bob")));
    let rows = bob.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].creator.display_name, "Alice");
    assert_eq!(rows[0].creator.status, PresenceStatus::Online);
    assert!(rows[0].assigned_to_me);
    assert!(!rows[0].editable);

    bob.board_mut().set_progress(created.task.id, 100).await.unwrap();
    alice.pump();
    assert_eq!(alice.board().counts().completed, 1);

    let err = bob
        .board_mut()
        .edit_task(
            created.task.id,
            TaskEdit {
                title: Some("Mine now".to_string()),
                ..TaskEdit::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::Permission(_)));

    assert_eq!(bob.mark_notifications_read().await.unwrap(), 1);
    bob.pump();
    assert_eq!(bob.inbox().unread_count(), 0);

    alice.board_mut().delete_task(created.task.id).await.unwrap();
    bob.pump();
    assert!(bob.board().tasks().is_empty());
}

#[tokio::test]
async fn second_assignee_sees_and_moves_the_task() {
    let backend = Arc::new(InMemoryBackend::new());
    let mut alice = start(&backend, "alice", "Alice").await;
    let mut bob = start(&backend, "bob", "Bob").await;
    let mut carol = start(&backend, "carol", "Carol").await;

    let created = alice
        .board_mut()
        .create_task(TaskDraft {
            title: "Pair review".to_string(),
            assignees: vec![user("bob"), user("carol")],
            ..TaskDraft::default()
        })
        .await
        .unwrap();
    assert_eq!(created.fan_out.created, 2);

    let stats = carol.pump();
    assert_eq!(stats.tasks, 1);
    assert_eq!(stats.assignments, 2);
    assert_eq!(carol.inbox().unread_count(), 1);

    carol.set_filter(TaskFilter::AssignedTo(user("carol")));
    let rows = carol.rows();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].assigned_to_me);
    let names: Vec<&str> = rows[0]
        .assignees
        .iter()
        .map(|p| p.display_name.as_str())
        .collect();
    assert_eq!(names, ["Bob", "Carol"]);
    assert_eq!(carol.board().counts().assigned_to_me, 1);

    carol
        .board_mut()
        .set_progress(created.task.id, 50)
        .await
        .unwrap();
    bob.pump();
    assert_eq!(bob.board().task(created.task.id).unwrap().progress.value(), 50);

    alice.board_mut().delete_task(created.task.id).await.unwrap();
    carol.pump();
    assert!(carol.visible_tasks().is_empty());
    assert_eq!(carol.board().counts().assigned_to_me, 0);
}

#[tokio::test]
async fn shutdown_is_seen_as_offline_and_stops_mutation() {
    let backend = Arc::new(InMemoryBackend::new());
    let mut alice = start(&backend, "alice", "Alice").await;
    let mut bob = start(&backend, "bob", "Bob").await;
    bob.pump();

    alice.shutdown();
    bob.pump();
    assert_eq!(bob.presence().status(&user("alice")), PresenceStatus::Offline);

    bob.board_mut()
        .create_task(TaskDraft {
            title: "After teardown".to_string(),
            ..TaskDraft::default()
        })
        .await
        .unwrap();
    assert!(alice.pump().is_empty());
    assert!(alice.board().tasks().is_empty());
    assert_eq!(
        alice
            .board_mut()
            .create_task(TaskDraft {
                title: "x".to_string(),
                ..TaskDraft::default()
            })
            .await
            .unwrap_err(),
        ActionError::SessionClosed
    );
    assert_eq!(backend.task_subscriber_count(), 1);
}

#[tokio::test]
async fn process_next_wakes_on_remote_change() {
    let backend = Arc::new(InMemoryBackend::new());
    let mut alice = start(&backend, "alice", "Alice").await;
    let writer = Arc::clone(&backend);

    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        writer
            .insert_task(
                &user("carol"),
                taskboard_proto::task::NewTask {
                    title: "From afar".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    });

    let woke = tokio::time::timeout(Duration::from_secs(2), alice.process_next())
        .await
        .unwrap();
    assert!(woke);
    handle.await.unwrap();
    assert_eq!(alice.board().tasks()[0].title, "From afar");
}

#[tokio::test]
async fn auth_stream_drives_the_session_slot() {
    let backend = Arc::new(InMemoryBackend::new());
    let auth = Auth::new();
    let mut changes = auth.subscribe();
    let mut slot = SessionSlot::new(Arc::clone(&backend), named("Alice"));

    auth.sign_in(user("alice"));
    changes.changed().await.unwrap();
    let current = changes.borrow_and_update().clone();
    slot.apply_auth(current).await.unwrap();
    assert!(slot.session().is_some());
    assert!(backend.presence_snapshot().contains(&user("alice")));

    auth.sign_out();
    changes.changed().await.unwrap();
    let current = changes.borrow_and_update().clone();
    slot.apply_auth(current).await.unwrap();
    assert!(slot.session().is_none());
    assert!(backend.presence_snapshot().is_empty());
    assert_eq!(backend.task_subscriber_count(), 0);
    assert_eq!(backend.notification_subscriber_count(), 0);
}
