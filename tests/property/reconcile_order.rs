//! Property-based reconciliation tests.
//!
//! Uses proptest to verify:
//! 1. Events for disjoint task identifiers yield the same collection
//!    content in any relative order.
//! 2. Re-applying an insert never duplicates an entity.
//! 3. Updates and deletes for unknown identifiers never change anything.

use std::collections::BTreeMap;

use proptest::prelude::*;
use taskboard::board::{apply_all, apply_change};
use taskboard_proto::change::ChangeEvent;
use taskboard_proto::profile::UserId;
use taskboard_proto::task::{Priority, Progress, Task, TaskId, TaskRow};
use uuid::Uuid;

// --- Strategies ---

fn arb_priority() -> impl Strategy<Value = Option<Priority>> {
    prop_oneof![
        Just(None),
        Just(Some(Priority::Low)),
        Just(Some(Priority::Medium)),
        Just(Some(Priority::High)),
    ]
}

fn arb_task(id: TaskId) -> impl Strategy<Value = Task> {
    (
        "[a-z ]{1,16}",
        0_u8..=100,
        prop::option::of("[a-c]"),
        0_u64..1_000_000,
        arb_priority(),
    )
        .prop_map(move |(title, progress, assignee, created_at, priority)| Task {
            id,
            title,
            description: None,
            progress: Progress::clamped(progress),
            assignee: assignee.as_deref().map(UserId::from),
            created_by: UserId::from("owner"),
            created_at,
            priority,
        })
}

/// The event history of one task: an insert, then updates, maybe a delete.
fn arb_history(id: TaskId) -> impl Strategy<Value = Vec<ChangeEvent<TaskRow>>> {
    (
        arb_task(id),
        prop::collection::vec(0_u8..=100, 0..4),
        any::<bool>(),
    )
        .prop_map(move |(task, updates, deleted)| {
            let mut events = vec![ChangeEvent::insert(TaskRow::from(&task))];
            events.extend(updates.into_iter().map(|p| {
                ChangeEvent::update(TaskRow {
                    progress: Some(Progress::clamped(p)),
                    ..TaskRow::key(id)
                })
            }));
            if deleted {
                events.push(ChangeEvent::delete(TaskRow::key(id)));
            }
            events
        })
}

/// Histories for distinct identifiers.
fn arb_histories() -> impl Strategy<Value = Vec<Vec<ChangeEvent<TaskRow>>>> {
    prop::collection::btree_set(any::<u128>(), 1..6).prop_flat_map(|ids| {
        ids.into_iter()
            .map(|n| arb_history(TaskId::from_uuid(Uuid::from_u128(n))))
            .collect::<Vec<_>>()
    })
}

/// Interleaves histories, keeping each one's internal order.
fn interleave(histories: &[Vec<ChangeEvent<TaskRow>>], picks: &[usize]) -> Vec<ChangeEvent<TaskRow>> {
    let mut cursors = vec![0; histories.len()];
    let mut out = Vec::new();
    let mut pick = picks.iter().copied().cycle();
    while out.len() < histories.iter().map(Vec::len).sum::<usize>() {
        let live: Vec<usize> = (0..histories.len())
            .filter(|&h| cursors[h] < histories[h].len())
            .collect();
        let h = live[pick.next().unwrap_or(0) % live.len()];
        out.push(histories[h][cursors[h]].clone());
        cursors[h] += 1;
    }
    out
}

fn by_id(tasks: &[Task]) -> BTreeMap<TaskId, Task> {
    tasks.iter().map(|t| (t.id, t.clone())).collect()
}

proptest! {
    #[test]
    fn disjoint_histories_commute(
        histories in arb_histories(),
        picks_a in prop::collection::vec(any::<usize>(), 1..32),
        picks_b in prop::collection::vec(any::<usize>(), 1..32),
    ) {
        let mut a = Vec::new();
        apply_all(&mut a, &interleave(&histories, &picks_a));
        let mut b = Vec::new();
        apply_all(&mut b, &interleave(&histories, &picks_b));

        prop_assert_eq!(a.len(), b.len());
        prop_assert_eq!(by_id(&a), by_id(&b));
    }

    #[test]
    fn repeated_insert_never_duplicates(
        task in arb_task(TaskId::new()),
        repeats in 1_usize..5,
    ) {
        let event = ChangeEvent::insert(TaskRow::from(&task));
        let mut tasks = Vec::new();
        for _ in 0..repeats {
            apply_change(&mut tasks, &event);
        }
        prop_assert_eq!(tasks, vec![task]);
    }

    #[test]
    fn unknown_ids_are_noops(
        existing in arb_task(TaskId::new()),
        progress in 0_u8..=100,
    ) {
        let mut tasks = vec![existing];
        let before = tasks.clone();
        let stranger = TaskId::new();
        let events = [
            ChangeEvent::update(TaskRow {
                progress: Some(Progress::clamped(progress)),
                ..TaskRow::key(stranger)
            }),
            ChangeEvent::delete(TaskRow::key(stranger)),
        ];
        prop_assert_eq!(apply_all(&mut tasks, &events), 0);
        prop_assert_eq!(tasks, before);
    }
}
