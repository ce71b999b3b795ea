//! Integration tests for change-feed reconciliation.
//!
//! Drives `TaskBoard` from a live `InMemoryBackend` feed and from raw JSON
//! payloads shaped like the hosted store's `{eventType, new, old}` events.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::redundant_clone)]

use std::sync::Arc;

use serde_json::json;

use taskboard::backend::memory::InMemoryBackend;
use taskboard::backend::{Backend, Delivery, Subscription};
use taskboard::board::{Applied, Skip, TaskBoard, TaskDraft, TaskFilter, apply_all, apply_change};
use taskboard_proto::change::ChangeEvent;
use taskboard_proto::profile::UserId;
use taskboard_proto::task::{MAX_TASK_TITLE_LENGTH, Progress, Task, TaskId, TaskRow};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn alice() -> UserId {
    UserId::from("alice")
}

fn bob() -> UserId {
    UserId::from("bob")
}

fn make_task(id: TaskId, title: &str, progress: u8) -> Task {
    Task {
        id,
        title: title.to_string(),
        description: None,
        progress: Progress::clamped(progress),
        assignee: None,
        created_by: alice(),
        created_at: 1_000,
        priority: None,
    }
}

/// Drains every pending event into `board`.
fn drain(board: &mut TaskBoard<InMemoryBackend>, feed: &mut Subscription<ChangeEvent<TaskRow>>) -> usize {
    let mut applied = 0;
    while let Some(delivery) = feed.try_next() {
        if let Delivery::Event(event) = delivery
            && board.apply_change(&event).changed()
        {
            applied += 1;
        }
    }
    applied
}

async fn board_for(backend: &Arc<InMemoryBackend>, user: UserId) -> TaskBoard<InMemoryBackend> {
    TaskBoard::load(Arc::clone(backend), user, MAX_TASK_TITLE_LENGTH)
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Pure reducer scenario
// ---------------------------------------------------------------------------

#[test]
fn snapshot_then_duplicate_insert_then_noop_then_delete() {
    let id = TaskId::new();
    let mut tasks = vec![make_task(id, "x", 0)];

    let dup = ChangeEvent::insert(TaskRow::from(&make_task(id, "x", 50)));
    assert_eq!(apply_change(&mut tasks, &dup), Applied::Replaced);
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].progress.value(), 50);

    let missing = ChangeEvent::update(TaskRow {
        progress: Some(Progress::clamped(10)),
        ..TaskRow::key(TaskId::new())
    });
    let before = tasks.clone();
    assert_eq!(
        apply_change(&mut tasks, &missing),
        Applied::Ignored(Skip::UnknownTask)
    );
    assert_eq!(tasks, before);

    apply_change(&mut tasks, &ChangeEvent::delete(TaskRow::key(id)));
    assert!(tasks.is_empty());
}

#[test]
fn delete_of_unknown_id_leaves_collection_unchanged() {
    let mut tasks = vec![make_task(TaskId::new(), "a", 0), make_task(TaskId::new(), "b", 0)];
    let before = tasks.clone();
    let changed = apply_all(&mut tasks, &[ChangeEvent::delete(TaskRow::key(TaskId::new()))]);
    assert_eq!(changed, 0);
    assert_eq!(tasks, before);
}

// ---------------------------------------------------------------------------
// Raw payloads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn raw_payloads_follow_the_same_rules() {
    let backend = Arc::new(InMemoryBackend::new());
    let mut board = board_for(&backend, alice()).await;
    let id = TaskId::new();

    let insert = json!({
        "eventType": "INSERT",
        "new": {"id": id, "title": "raw", "user_id": "alice", "progress_perc": 0, "priority": "high"},
        "old": {}
    });
    assert_eq!(board.apply_raw(insert.to_string().as_bytes()), Applied::Inserted);

    let update = json!({
        "eventType": "UPDATE",
        "new": {"id": id, "progress_perc": 40, "priority": null},
        "old": {"id": id}
    });
    assert_eq!(board.apply_raw(update.to_string().as_bytes()), Applied::Updated);
    let task = board.task(id).unwrap();
    assert_eq!(task.title, "raw");
    assert_eq!(task.progress.value(), 40);
    assert_eq!(task.priority, None);

    let no_title = json!({"eventType": "INSERT", "new": {"id": TaskId::new(), "user_id": "bob"}});
    assert_eq!(
        board.apply_raw(no_title.to_string().as_bytes()),
        Applied::Ignored(Skip::Incomplete("title"))
    );

    let garbage = json!({"eventType": "UPDATE", "new": {"id": id, "progress_perc": 900}});
    assert_eq!(
        board.apply_raw(garbage.to_string().as_bytes()),
        Applied::Ignored(Skip::Undecodable)
    );

    let delete = json!({"eventType": "DELETE", "new": {}, "old": {"id": id}});
    assert_eq!(board.apply_raw(delete.to_string().as_bytes()), Applied::Removed);
    assert!(board.tasks().is_empty());
}

// ---------------------------------------------------------------------------
// Live feed between two boards
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_boards_converge_through_the_feed() {
    let backend = Arc::new(InMemoryBackend::new());
    let mut alice_feed = backend.subscribe_tasks();
    let mut bob_feed = backend.subscribe_tasks();
    let mut alice_board = board_for(&backend, alice()).await;
    let mut bob_board = board_for(&backend, bob()).await;

    let created = alice_board
        .create_task(TaskDraft {
            title: "Shared".to_string(),
            assignees: vec![bob()],
            ..TaskDraft::default()
        })
        .await
        .unwrap();
    // Alice already holds the acknowledged row; the echo replaces it.
    assert_eq!(drain(&mut alice_board, &mut alice_feed), 1);
    assert_eq!(drain(&mut bob_board, &mut bob_feed), 1);
    assert_eq!(alice_board.tasks(), bob_board.tasks());

    bob_board.set_progress(created.task.id, 100).await.unwrap();
    drain(&mut alice_board, &mut alice_feed);
    drain(&mut bob_board, &mut bob_feed);
    assert_eq!(alice_board.tasks(), bob_board.tasks());
    assert_eq!(alice_board.view(&TaskFilter::Completed).len(), 1);
    assert_eq!(bob_board.counts().assigned_to_me, 1);

    alice_board.delete_task(created.task.id).await.unwrap();
    drain(&mut alice_board, &mut alice_feed);
    drain(&mut bob_board, &mut bob_feed);
    assert!(alice_board.tasks().is_empty());
    assert!(bob_board.tasks().is_empty());
}

#[tokio::test]
async fn replayed_events_are_harmless() {
    let backend = Arc::new(InMemoryBackend::new());
    let mut feed = backend.subscribe_tasks();
    let mut board = board_for(&backend, alice()).await;

    let task = board
        .create_task(TaskDraft {
            title: "Replay me".to_string(),
            ..TaskDraft::default()
        })
        .await
        .unwrap()
        .task;
    board.set_progress(task.id, 20).await.unwrap();

    let mut events = Vec::new();
    while let Some(Delivery::Event(event)) = feed.try_next() {
        events.push(event);
    }
    assert_eq!(events.len(), 2);

    // At-least-once delivery: the same events arrive again.
    for event in events.iter().chain(events.iter()) {
        backend.publish_task_change(event.clone());
    }
    drain(&mut board, &mut feed);
    assert_eq!(board.tasks().len(), 1);
    assert_eq!(board.tasks()[0].progress.value(), 20);
}
