//! List deletion under store failures.
//!
//! A list delete removes the list's tasks first and the list document
//! last, so an interruption can strand an empty list but never orphaned
//! tasks. Every failure surfaces as `BoardError::Delete`, and running the
//! delete again after the store recovers finishes the job.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use taskboard::adapter::ListTaskStore;
use taskboard::error::BoardError;
use taskboard::store::memory::{MemoryStore, StoreOp};
use taskboard_proto::document::StoreError;
use taskboard_proto::model::{
    ListId, Priority, Task, TaskDraft, TodoList, UserId, collections,
};

fn draft(title: &str) -> TaskDraft {
    TaskDraft {
        title: title.to_string(),
        description: "desc".to_string(),
        due_date: "2024-03-01".to_string(),
        priority: Some(Priority::Medium),
    }
}

struct Fixture {
    store: MemoryStore,
    adapter: ListTaskStore<MemoryStore>,
    doomed: TodoList,
    kept: TodoList,
}

async fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let adapter = ListTaskStore::new(Arc::new(store.clone()));
    let owner = UserId::new("u1");
    let doomed = adapter.create_list("Doomed", &owner).await.unwrap();
    let kept = adapter.create_list("Kept", &owner).await.unwrap();
    for title in ["a", "b", "c"] {
        adapter.create_task(&doomed.id, &draft(title), &owner).await.unwrap();
    }
    adapter.create_task(&kept.id, &draft("keep"), &owner).await.unwrap();
    Fixture {
        store,
        adapter,
        doomed,
        kept,
    }
}

fn list_ids(store: &MemoryStore) -> Vec<ListId> {
    store
        .documents(collections::LISTS)
        .into_iter()
        .map(|doc| ListId::from(doc.id))
        .collect()
}

fn task_lists(store: &MemoryStore) -> Vec<ListId> {
    store
        .documents(collections::TASKS)
        .iter()
        .map(|doc| Task::from_document(doc).unwrap().list_id)
        .collect()
}

fn assert_no_orphans(store: &MemoryStore) {
    let lists = list_ids(store);
    for list_id in task_lists(store) {
        assert!(lists.contains(&list_id), "task left behind in deleted list {list_id}");
    }
}

#[tokio::test]
async fn query_failure_deletes_nothing() {
    let f = fixture().await;
    f.store.fail_on(StoreOp::Query, StoreError::Unavailable("offline".into()));

    let err = f.adapter.delete_list(&f.doomed.id).await.unwrap_err();
    assert!(matches!(err, BoardError::Delete { ref list_id, .. } if *list_id == f.doomed.id));
    assert_eq!(list_ids(&f.store).len(), 2);
    assert_eq!(task_lists(&f.store).len(), 4);
}

#[tokio::test]
async fn batch_failure_keeps_list_and_tasks() {
    let f = fixture().await;
    f.store.fail_on(StoreOp::BatchDelete, StoreError::PermissionDenied("rules".into()));

    let err = f.adapter.delete_list(&f.doomed.id).await.unwrap_err();
    assert_eq!(
        err,
        BoardError::Delete {
            list_id: f.doomed.id.clone(),
            source: StoreError::PermissionDenied("rules".into()),
        }
    );
    assert_eq!(task_lists(&f.store).len(), 4, "batch is all-or-nothing");
    assert_no_orphans(&f.store);
}

#[tokio::test]
async fn list_delete_failure_strands_only_an_empty_list() {
    let f = fixture().await;
    f.store.fail_on(StoreOp::Delete, StoreError::Timeout);

    let err = f.adapter.delete_list(&f.doomed.id).await.unwrap_err();
    assert!(matches!(err, BoardError::Delete { source: StoreError::Timeout, .. }));
    assert!(list_ids(&f.store).contains(&f.doomed.id));
    assert_eq!(task_lists(&f.store), vec![f.kept.id.clone()]);
    assert_no_orphans(&f.store);
}

#[tokio::test]
async fn retry_after_recovery_completes() {
    let f = fixture().await;
    f.store.fail_on(StoreOp::Delete, StoreError::Timeout);
    f.adapter.delete_list(&f.doomed.id).await.unwrap_err();

    f.store.clear_faults();
    f.adapter.delete_list(&f.doomed.id).await.unwrap();
    assert_eq!(list_ids(&f.store), vec![f.kept.id.clone()]);
    assert_eq!(task_lists(&f.store), vec![f.kept.id.clone()]);

    // Deleting an already deleted list is harmless.
    f.adapter.delete_list(&f.doomed.id).await.unwrap();
    assert_eq!(list_ids(&f.store), vec![f.kept.id]);
}

#[tokio::test]
async fn delete_error_has_user_message() {
    let f = fixture().await;
    f.store.fail_on(StoreOp::BatchDelete, StoreError::Timeout);
    let err = f.adapter.delete_list(&f.doomed.id).await.unwrap_err();
    assert_eq!(
        err.user_message(),
        "The list could not be fully deleted. Please try again."
    );
}
