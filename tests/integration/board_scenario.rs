//! End-to-end board flow against the in-process store.
//!
//! Covers the Groceries walkthrough (create list, add task, drag it to High,
//! delete the list) plus the store-level guarantees behind it: new lists
//! reach live subscribers, invalid input never writes, and a list delete
//! leaves no tasks behind.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use taskboard::adapter::ListTaskStore;
use taskboard::board::Board;
use taskboard::context::ClientContext;
use taskboard::error::{BoardError, ValidationError};
use taskboard::identity::memory::MemoryIdentity;
use taskboard::reorder::DragResult;
use taskboard::session::TodoSession;
use taskboard::store::DocumentStore;
use taskboard::store::memory::{MemoryStore, StoreOp};
use taskboard_proto::document::Query;
use taskboard_proto::model::{
    ColumnId, Priority, Task, TaskDraft, TodoList, UserId, collections, fields,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn milk() -> TaskDraft {
    TaskDraft {
        title: "Milk".to_string(),
        description: "2%".to_string(),
        due_date: "2024-01-01".to_string(),
        priority: Some(Priority::Low),
    }
}

async fn signed_in() -> (
    ClientContext<MemoryStore, MemoryIdentity>,
    Arc<TodoSession<MemoryStore>>,
) {
    let ctx = ClientContext::in_memory();
    let user = ctx.sign_up("ada@example.com", "hunter22").await.unwrap();
    let session = ctx.open_session(user).await.unwrap();
    (ctx, session)
}

/// Waits until the session's board satisfies `pred`.
async fn settle<S, F>(session: &TodoSession<S>, mut pred: F) -> Board
where
    S: DocumentStore,
    F: FnMut(&Board) -> bool,
{
    let mut updates = session.updates();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let board = session.board();
            if pred(&board) || updates.changed().await.is_err() {
                return board;
            }
        }
    })
    .await
    .expect("board did not settle")
}

async fn tasks_in_list(store: &MemoryStore, list: &TodoList) -> Vec<Task> {
    store
        .query(&Query::collection(collections::TASKS).where_eq(fields::LIST_ID, list.id.as_str()))
        .await
        .unwrap()
        .iter()
        .map(|doc| Task::from_document(doc).unwrap())
        .collect()
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

#[tokio::test]
async fn groceries_walkthrough() {
    let (ctx, session) = signed_in().await;
    let store = Arc::clone(ctx.store());

    let groceries = session.add_list("Groceries").await.unwrap();
    settle(&session, |b| b.list(&groceries.id).is_some()).await;

    let task = session.add_task(&groceries.id, &milk()).await.unwrap();
    let board = settle(&session, |b| b.task(&task.id).is_some()).await;
    let tasks = board.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].list_id, groceries.id);
    assert_eq!(tasks[0].priority, Priority::Low);

    let drag = DragResult {
        task_id: task.id.clone(),
        source: ColumnId::new(groceries.id.clone(), Priority::Low),
        destination: Some(ColumnId::new(groceries.id.clone(), Priority::High)),
    };
    session.on_drag_end(&drag).await.unwrap();
    let board = settle(&session, |b| {
        b.pending_moves() == 0 && b.task(&task.id).is_some_and(|t| t.priority == Priority::High)
    })
    .await;
    let moved = board.task(&task.id).unwrap();
    assert_eq!(moved.list_id, groceries.id);
    assert_eq!(tasks_in_list(&store, &groceries).await[0].priority, Priority::High);

    session.delete_list(&groceries.id).await.unwrap();
    let board = settle(&session, |b| b.lists().is_empty() && b.tasks().is_empty()).await;
    assert!(board.lists().is_empty());
    assert!(board.tasks().is_empty());
    assert!(store.documents(collections::LISTS).is_empty());
    assert!(store.documents(collections::TASKS).is_empty());
    assert_eq!(store.calls(StoreOp::Delete), 1, "one delete per list document");
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn created_lists_reach_live_subscribers() {
    let store = MemoryStore::new();
    let adapter = ListTaskStore::new(Arc::new(store));
    let owner = UserId::new("u1");

    for name in ["Groceries", "  Work  ", "a", "Ünïcode ✓"] {
        let created = adapter.create_list(name, &owner).await.unwrap();
        let mut live = adapter.watch_lists(&owner).await.unwrap();
        let lists = live.current();
        let found = lists.iter().find(|l| l.id == created.id).unwrap();
        assert_eq!(found.name, name.trim());
        assert_eq!(lists.iter().filter(|l| l.id == created.id).count(), 1);

        // Later lists show up on an existing live query too.
        let next = adapter.create_list("next", &owner).await.unwrap();
        let lists = live.changed().await.unwrap();
        assert!(lists.iter().any(|l| l.id == next.id));
        assert_ne!(next.id, created.id);
    }
}

#[tokio::test]
async fn deleted_list_leaves_no_tasks() {
    let store = MemoryStore::new();
    let adapter = ListTaskStore::new(Arc::new(store.clone()));
    let owner = UserId::new("u1");

    for task_count in [0, 1, 5] {
        let list = adapter.create_list("List", &owner).await.unwrap();
        for _ in 0..task_count {
            adapter.create_task(&list.id, &milk(), &owner).await.unwrap();
        }
        adapter.delete_list(&list.id).await.unwrap();
        assert!(tasks_in_list(&store, &list).await.is_empty());
    }
    assert!(store.documents(collections::LISTS).is_empty());
}

#[tokio::test]
async fn incomplete_task_never_writes() {
    let (ctx, session) = signed_in().await;
    let list = session.add_list("Groceries").await.unwrap();
    settle(&session, |b| b.list(&list.id).is_some()).await;
    let writes = ctx.store().write_count();

    let drafts = [
        TaskDraft { title: String::new(), ..milk() },
        TaskDraft { description: "   ".to_string(), ..milk() },
        TaskDraft { due_date: String::new(), ..milk() },
        TaskDraft { priority: None, ..milk() },
    ];
    for draft in &drafts {
        let err = session.add_task(&list.id, draft).await.unwrap_err();
        assert!(matches!(err, BoardError::Validation(ValidationError::MissingField(_))));
        assert!(!err.user_message().is_empty());
    }
    assert_eq!(ctx.store().write_count(), writes);
}

#[tokio::test]
async fn users_only_see_their_own_board() {
    let ctx = ClientContext::in_memory();
    let ada = ctx.sign_up("ada@example.com", "hunter22").await.unwrap();
    let ada_session = ctx.open_session(ada.clone()).await.unwrap();
    ada_session.add_list("Ada's").await.unwrap();

    // A second context sharing the store, signed in as someone else.
    let other = ClientContext::new(Arc::clone(ctx.store()), Arc::new(MemoryIdentity::new()));
    let bob = other.sign_up("bob@example.com", "hunter22").await.unwrap();
    let bob_session = other.open_session(bob).await.unwrap();
    assert!(bob_session.board().lists().is_empty());

    bob_session.add_list("Bob's").await.unwrap();
    let board = settle(&ada_session, |b| b.lists().len() == 1).await;
    assert_eq!(board.lists()[0].name, "Ada's");
    assert_eq!(board.lists()[0].owner_id, ada);
}

#[tokio::test]
async fn moves_only_land_in_the_users_own_lists() {
    let (ctx, session) = signed_in().await;
    let store = Arc::clone(ctx.store());
    let groceries = session.add_list("Groceries").await.unwrap();
    settle(&session, |b| b.list(&groceries.id).is_some()).await;
    let task = session.add_task(&groceries.id, &milk()).await.unwrap();
    settle(&session, |b| b.task(&task.id).is_some()).await;

    let other = ClientContext::new(Arc::clone(ctx.store()), Arc::new(MemoryIdentity::new()));
    let bob = other.sign_up("bob@example.com", "hunter22").await.unwrap();
    let bobs = other.open_session(bob).await.unwrap().add_list("Bob's").await.unwrap();

    let low = ColumnId::new(groceries.id.clone(), Priority::Low);
    for destination in [
        ColumnId::new(bobs.id.clone(), Priority::High),
        "no-such-list-High".parse().unwrap(),
    ] {
        let err = session
            .move_task(task.id.as_str(), &low.to_string(), &destination.to_string())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BoardError::Validation(ValidationError::UnknownList(destination.list_id))
        );
    }

    assert_eq!(store.calls(StoreOp::Update), 0);
    let stored = tasks_in_list(&store, &groceries).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].column(), low);
    assert_eq!(session.board().task(&task.id).unwrap().column(), low);
}
