//! Property tests for the reorder engine.
//!
//! A drag may only ever change the dragged task's list and priority; every
//! other task, and every other field, must come back untouched.

use chrono::NaiveDate;
use proptest::prelude::*;
use taskboard::reorder::{DragResult, reorder, revert};
use taskboard_proto::model::{ColumnId, ListId, Priority, Task, TaskId, UserId};

fn arb_priority() -> impl Strategy<Value = Priority> {
    prop::sample::select(Priority::ALL.to_vec())
}

fn arb_list_id() -> impl Strategy<Value = ListId> {
    prop::sample::select(vec!["groceries", "work", "home-improvement"]).prop_map(ListId::new)
}

fn arb_column() -> impl Strategy<Value = ColumnId> {
    (arb_list_id(), arb_priority()).prop_map(|(list_id, priority)| ColumnId::new(list_id, priority))
}

fn arb_task(index: usize) -> impl Strategy<Value = Task> {
    (
        "[a-zA-Z ]{1,24}",
        "[a-zA-Z0-9 %]{1,48}",
        0u32..3650,
        arb_column(),
    )
        .prop_map(move |(title, description, days, column)| Task {
            id: TaskId::new(format!("task-{index}")),
            title,
            description,
            due_date: NaiveDate::from_ymd_opt(2020, 1, 1)
                .and_then(|d| d.checked_add_days(chrono::Days::new(u64::from(days))))
                .unwrap_or_default(),
            priority: column.priority,
            list_id: column.list_id,
            owner_id: UserId::new("u1"),
        })
}

fn arb_tasks() -> impl Strategy<Value = Vec<Task>> {
    (1usize..8).prop_flat_map(|n| (0..n).map(arb_task).collect::<Vec<_>>())
}

proptest! {
    #[test]
    fn drag_changes_only_the_dragged_tasks_column(
        tasks in arb_tasks(),
        pick in any::<prop::sample::Index>(),
        destination in arb_column(),
    ) {
        let dragged = pick.get(&tasks).clone();
        let drag = DragResult {
            task_id: dragged.id.clone(),
            source: dragged.column(),
            destination: Some(destination.clone()),
        };
        let (after, assignment) = reorder(tasks.clone(), &drag);
        prop_assert_eq!(after.len(), tasks.len());

        for (before, after) in tasks.iter().zip(&after) {
            if before.id == dragged.id {
                prop_assert_eq!(&after.list_id, &destination.list_id);
                prop_assert_eq!(after.priority, destination.priority);
                prop_assert_eq!(&after.title, &before.title);
                prop_assert_eq!(&after.description, &before.description);
                prop_assert_eq!(after.due_date, before.due_date);
                prop_assert_eq!(&after.owner_id, &before.owner_id);
            } else {
                prop_assert_eq!(after, before);
            }
        }

        if destination == dragged.column() {
            prop_assert!(assignment.is_none());
            prop_assert_eq!(&after, &tasks);
        } else {
            let assignment = assignment.unwrap();
            prop_assert_eq!(&assignment.to, &destination);
            prop_assert_eq!(&assignment.from, &dragged.column());

            let mut undone = after;
            prop_assert!(revert(&mut undone, &assignment));
            prop_assert_eq!(undone, tasks);
        }
    }

    #[test]
    fn cancelled_drag_is_identity(tasks in arb_tasks(), pick in any::<prop::sample::Index>()) {
        let dragged = pick.get(&tasks);
        let drag = DragResult {
            task_id: dragged.id.clone(),
            source: dragged.column(),
            destination: None,
        };
        let (after, assignment) = reorder(tasks.clone(), &drag);
        prop_assert!(assignment.is_none());
        prop_assert_eq!(after, tasks);
    }

    #[test]
    fn unknown_task_is_identity(tasks in arb_tasks(), destination in arb_column()) {
        let drag = DragResult {
            task_id: TaskId::new("not-on-the-board"),
            source: ColumnId::new(ListId::new("groceries"), Priority::Low),
            destination: Some(destination),
        };
        let (after, assignment) = reorder(tasks.clone(), &drag);
        prop_assert!(assignment.is_none());
        prop_assert_eq!(after, tasks);
    }
}
