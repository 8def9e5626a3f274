//! List/task store adapter.
//!
//! Translates board intents (add list, add task, rename, delete, move) into
//! document store calls, and normalizes store documents back into
//! [`TodoList`] and [`Task`] values. Input is validated before anything is
//! sent, so a rejected intent never reaches the store.

use std::sync::Arc;

use chrono::NaiveDate;
use taskboard_proto::document::{Document, DocumentError, DocumentId, FieldValue, Fields, Query};
use taskboard_proto::model::{
    DUE_DATE_FORMAT, ListId, Priority, Task, TaskDraft, TaskId, TodoList, UserId, collections,
    fields,
};

use crate::error::{BoardError, ValidationError};
use crate::store::{DocumentStore, Subscription, SubscriptionHandle};

/// Validated task input, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidTask {
    /// Trimmed title.
    pub title: String,
    /// Trimmed description.
    pub description: String,
    /// Parsed due date.
    pub due_date: NaiveDate,
    /// Chosen priority.
    pub priority: Priority,
}

/// Trims a list name and rejects it if nothing is left.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyListName`] for blank names.
pub fn validate_list_name(name: &str) -> Result<&str, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        Err(ValidationError::EmptyListName)
    } else {
        Ok(name)
    }
}

/// Checks that every task field is filled in and the due date parses.
///
/// # Errors
///
/// Returns [`ValidationError::MissingField`] naming the first empty field,
/// or [`ValidationError::InvalidDueDate`].
pub fn validate_draft(draft: &TaskDraft) -> Result<ValidTask, ValidationError> {
    let title = draft.title.trim();
    if title.is_empty() {
        return Err(ValidationError::MissingField("title"));
    }
    let description = draft.description.trim();
    if description.is_empty() {
        return Err(ValidationError::MissingField("description"));
    }
    let due_text = draft.due_date.trim();
    if due_text.is_empty() {
        return Err(ValidationError::MissingField("due date"));
    }
    let due_date = NaiveDate::parse_from_str(due_text, DUE_DATE_FORMAT)
        .map_err(|_| ValidationError::InvalidDueDate(due_text.to_string()))?;
    let priority = draft
        .priority
        .ok_or(ValidationError::MissingField("priority"))?;

    Ok(ValidTask {
        title: title.to_string(),
        description: description.to_string(),
        due_date,
        priority,
    })
}

type Normalize<T> = fn(&Document) -> Result<T, DocumentError>;

/// Normalizes a snapshot, skipping documents that do not fit the model.
fn normalize_all<T>(docs: &[Document], normalize: Normalize<T>) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match normalize(doc) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(id = %doc.id, error = %e, "skipping malformed document");
                None
            }
        })
        .collect()
}

/// A live query over typed entities: the pull binding of the adapter's
/// subscriptions.
pub struct LiveQuery<T> {
    subscription: Subscription,
    normalize: Normalize<T>,
}

impl<T> std::fmt::Debug for LiveQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQuery")
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> LiveQuery<T> {
    /// The most recent snapshot.
    #[must_use]
    pub fn current(&self) -> Vec<T> {
        normalize_all(&self.subscription.current(), self.normalize)
    }

    /// Waits for the next snapshot; `None` once the live query has ended.
    pub async fn changed(&mut self) -> Option<Vec<T>> {
        let docs = self.subscription.changed().await?;
        Some(normalize_all(&docs, self.normalize))
    }

    /// Switches to the push binding. See [`Subscription::on_change`].
    pub fn on_change<F>(self, mut on_change: F) -> SubscriptionHandle
    where
        F: FnMut(Vec<T>) + Send + 'static,
    {
        let normalize = self.normalize;
        self.subscription
            .on_change(move |docs| on_change(normalize_all(&docs, normalize)))
    }

    /// Cancels the live query.
    pub fn unsubscribe(self) {
        self.subscription.unsubscribe();
    }
}

/// Board operations on top of a [`DocumentStore`].
pub struct ListTaskStore<S> {
    store: Arc<S>,
}

impl<S> Clone for ListTaskStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: DocumentStore> ListTaskStore<S> {
    /// Wraps a store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Creates a list named `name` (trimmed) for `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Validation`] for a blank name, or
    /// [`BoardError::Store`] if the write fails.
    pub async fn create_list(&self, name: &str, owner: &UserId) -> Result<TodoList, BoardError> {
        let name = validate_list_name(name)?;
        let doc = self
            .store
            .create(
                collections::LISTS,
                Fields::from([
                    (fields::NAME.to_string(), FieldValue::from(name)),
                    (fields::USER_ID.to_string(), FieldValue::from(owner.as_str())),
                ]),
            )
            .await?;
        tracing::info!(list_id = %doc.id, "list created");
        Ok(TodoList {
            id: ListId::from(doc.id),
            name: name.to_string(),
            owner_id: owner.clone(),
        })
    }

    /// Renames a list. Its tasks are not touched.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Validation`] for a blank name, or
    /// [`BoardError::Store`] if the list does not exist or the write fails.
    pub async fn rename_list(&self, list_id: &ListId, new_name: &str) -> Result<(), BoardError> {
        let name = validate_list_name(new_name)?;
        self.store
            .update(
                collections::LISTS,
                &list_id.to_document_id(),
                Fields::from([(fields::NAME.to_string(), FieldValue::from(name))]),
            )
            .await?;
        tracing::info!(list_id = %list_id, "list renamed");
        Ok(())
    }

    /// Deletes a list and every task in it.
    ///
    /// Tasks go first, in one batch, then the list document. An interrupted
    /// delete can leave an empty list behind but never orphaned tasks, and
    /// running it again finishes the job.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Delete`] if any step fails.
    pub async fn delete_list(&self, list_id: &ListId) -> Result<(), BoardError> {
        let result = async {
            let query = Query::collection(collections::TASKS).where_eq(fields::LIST_ID, list_id.as_str());
            let task_ids: Vec<DocumentId> = self
                .store
                .query(&query)
                .await?
                .into_iter()
                .map(|doc| doc.id)
                .collect();
            if !task_ids.is_empty() {
                self.store
                    .batch_delete(collections::TASKS, &task_ids)
                    .await?;
            }
            self.store
                .delete(collections::LISTS, &list_id.to_document_id())
                .await?;
            Ok(task_ids.len())
        }
        .await;

        match result {
            Ok(tasks) => {
                tracing::info!(list_id = %list_id, tasks, "list deleted");
                Ok(())
            }
            Err(source) => {
                tracing::warn!(list_id = %list_id, error = %source, "list delete interrupted");
                Err(BoardError::Delete {
                    list_id: list_id.clone(),
                    source,
                })
            }
        }
    }

    /// Creates a task in `list_id` for `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Validation`] if the draft is incomplete (no
    /// store call is made), or [`BoardError::Store`] if the write fails.
    pub async fn create_task(
        &self,
        list_id: &ListId,
        draft: &TaskDraft,
        owner: &UserId,
    ) -> Result<Task, BoardError> {
        let valid = validate_draft(draft)?;
        let due_text = valid.due_date.format(DUE_DATE_FORMAT).to_string();
        let doc = self
            .store
            .create(
                collections::TASKS,
                Fields::from([
                    (fields::TITLE.to_string(), FieldValue::from(valid.title.as_str())),
                    (
                        fields::DESCRIPTION.to_string(),
                        FieldValue::from(valid.description.as_str()),
                    ),
                    (fields::DUE_DATE.to_string(), FieldValue::from(due_text)),
                    (
                        fields::PRIORITY.to_string(),
                        FieldValue::from(valid.priority.as_str()),
                    ),
                    (fields::LIST_ID.to_string(), FieldValue::from(list_id.as_str())),
                    (fields::USER_ID.to_string(), FieldValue::from(owner.as_str())),
                ]),
            )
            .await?;
        tracing::info!(task_id = %doc.id, list_id = %list_id, "task created");
        Ok(Task {
            id: TaskId::from(doc.id),
            title: valid.title,
            description: valid.description,
            due_date: valid.due_date,
            priority: valid.priority,
            list_id: list_id.clone(),
            owner_id: owner.clone(),
        })
    }

    /// Deletes a task. Deleting a task that does not exist succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Store`] if the store call fails.
    pub async fn delete_task(&self, task_id: &TaskId) -> Result<(), BoardError> {
        self.store
            .delete(collections::TASKS, &task_id.to_document_id())
            .await?;
        tracing::info!(task_id = %task_id, "task deleted");
        Ok(())
    }

    /// Moves a task to another column. Writes only `listId` and `priority`.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Store`] if the task does not exist or the write
    /// fails.
    pub async fn update_task_assignment(
        &self,
        task_id: &TaskId,
        list_id: &ListId,
        priority: Priority,
    ) -> Result<(), BoardError> {
        self.store
            .update(
                collections::TASKS,
                &task_id.to_document_id(),
                Fields::from([
                    (fields::LIST_ID.to_string(), FieldValue::from(list_id.as_str())),
                    (fields::PRIORITY.to_string(), FieldValue::from(priority.as_str())),
                ]),
            )
            .await?;
        tracing::debug!(task_id = %task_id, list_id = %list_id, %priority, "task reassigned");
        Ok(())
    }

    /// Live query over the owner's lists (pull binding).
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Store`] if the live query cannot be started.
    pub async fn watch_lists(&self, owner: &UserId) -> Result<LiveQuery<TodoList>, BoardError> {
        let subscription = self.store.subscribe(&owner_query(collections::LISTS, owner)).await?;
        Ok(LiveQuery {
            subscription,
            normalize: TodoList::from_document,
        })
    }

    /// Live query over the owner's tasks (pull binding).
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Store`] if the live query cannot be started.
    pub async fn watch_tasks(&self, owner: &UserId) -> Result<LiveQuery<Task>, BoardError> {
        let subscription = self.store.subscribe(&owner_query(collections::TASKS, owner)).await?;
        Ok(LiveQuery {
            subscription,
            normalize: Task::from_document,
        })
    }

    /// Calls `on_change` with every snapshot of the owner's lists, starting
    /// with the current one, until the handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Store`] if the live query cannot be started.
    pub async fn subscribe_lists<F>(
        &self,
        owner: &UserId,
        on_change: F,
    ) -> Result<SubscriptionHandle, BoardError>
    where
        F: FnMut(Vec<TodoList>) + Send + 'static,
    {
        Ok(self.watch_lists(owner).await?.on_change(on_change))
    }

    /// Calls `on_change` with every snapshot of the owner's tasks, starting
    /// with the current one, until the handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Store`] if the live query cannot be started.
    pub async fn subscribe_tasks<F>(
        &self,
        owner: &UserId,
        on_change: F,
    ) -> Result<SubscriptionHandle, BoardError>
    where
        F: FnMut(Vec<Task>) + Send + 'static,
    {
        Ok(self.watch_tasks(owner).await?.on_change(on_change))
    }
}

fn owner_query(collection: &str, owner: &UserId) -> Query {
    Query::collection(collection).where_eq(fields::USER_ID, owner.as_str())
}
