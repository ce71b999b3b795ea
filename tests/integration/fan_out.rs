//! Integration tests for assignment notifications.
//!
//! Covers actor exclusion, per-recipient failure isolation, and the live
//! inbox each recipient keeps from the notifications feed.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use taskboard::backend::memory::InMemoryBackend;
use taskboard::backend::{Backend, Delivery};
use taskboard::board::{TaskBoard, TaskDraft};
use taskboard::notify::{NotificationInbox, fan_out};
use taskboard_proto::profile::UserId;
use taskboard_proto::task::{MAX_TASK_TITLE_LENGTH, NewTask};

fn user(id: &str) -> UserId {
    UserId::from(id)
}

async fn board_for(backend: &Arc<InMemoryBackend>, id: &str) -> TaskBoard<InMemoryBackend> {
    TaskBoard::load(Arc::clone(backend), user(id), MAX_TASK_TITLE_LENGTH)
        .await
        .unwrap()
}

#[tokio::test]
async fn assigning_to_self_and_others_notifies_only_others() {
    let backend = Arc::new(InMemoryBackend::new());
    let mut board = board_for(&backend, "a").await;

    let created = board
        .create_task(TaskDraft {
            title: "Team task".to_string(),
            assignees: vec![user("a"), user("b"), user("c")],
            ..TaskDraft::default()
        })
        .await
        .unwrap();
    assert_eq!(created.assignments.len(), 3);
    assert_eq!(created.fan_out.created, 2);

    let mut recipients: Vec<UserId> = backend
        .notifications()
        .into_iter()
        .map(|n| n.user_id)
        .collect();
    recipients.sort();
    assert_eq!(recipients, vec![user("b"), user("c")]);
}

#[tokio::test]
async fn one_failed_recipient_does_not_block_the_rest() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.fail_notifications_for(&user("b"));
    let mut board = board_for(&backend, "a").await;

    let created = board
        .create_task(TaskDraft {
            title: "Partial".to_string(),
            assignees: vec![user("b"), user("c"), user("d")],
            ..TaskDraft::default()
        })
        .await
        .unwrap();

    assert_eq!(created.fan_out.created, 2);
    assert_eq!(created.fan_out.failed.len(), 1);
    assert_eq!(created.fan_out.failed[0].0, user("b"));
    // The assignment the failed notification describes still exists.
    let assignments = board.assignments(created.task.id).await.unwrap();
    assert!(assignments.iter().any(|a| a.user_id == user("b")));
    assert_eq!(board.tasks().len(), 1);
}

#[tokio::test]
async fn fan_out_directly_over_a_stored_task() {
    let backend = InMemoryBackend::new();
    let task = backend
        .insert_task(
            &user("a"),
            NewTask {
                title: "Direct".to_string(),
                ..NewTask::default()
            },
        )
        .await
        .unwrap();

    let report = fan_out(&backend, &user("a"), &task, &[user("a"), user("b"), user("b")]).await;
    assert_eq!(report.created, 1);
    assert!(report.is_complete());
    assert_eq!(backend.notifications()[0].related_task, Some(task.id));
}

#[tokio::test]
async fn inbox_tracks_live_notifications_and_mark_read() {
    let backend = Arc::new(InMemoryBackend::new());
    let mut feed = backend.subscribe_notifications();
    let mut inbox = NotificationInbox::new(user("b"));
    inbox.refresh(&*backend).await.unwrap();
    assert_eq!(inbox.unread_count(), 0);

    let mut board = board_for(&backend, "a").await;
    for title in ["First", "Second"] {
        board
            .create_task(TaskDraft {
                title: title.to_string(),
                assignees: vec![user("b"), user("c")],
                ..TaskDraft::default()
            })
            .await
            .unwrap();
    }

    while let Some(Delivery::Event(event)) = feed.try_next() {
        inbox.on_change(&event);
    }
    assert_eq!(inbox.unread_count(), 2);
    assert!(inbox.notifications()[0].message.contains("Second"));

    assert_eq!(inbox.mark_all_read(&*backend).await.unwrap(), 2);
    while let Some(Delivery::Event(event)) = feed.try_next() {
        inbox.on_change(&event);
    }
    assert_eq!(inbox.unread_count(), 0);
    assert!(backend.fetch_unread_notifications(&user("b")).await.unwrap().is_empty());
    assert_eq!(
        backend.fetch_unread_notifications(&user("c")).await.unwrap().len(),
        2
    );
}
