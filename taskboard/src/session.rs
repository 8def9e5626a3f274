//! A signed-in user's board session.
//!
//! [`TodoSession`] keeps a [`Board`] in sync with the user's live list and
//! task queries and routes every board intent through the adapter. Views
//! read the board with [`TodoSession::board`] and redraw when
//! [`TodoSession::updates`] ticks.

use std::sync::Arc;

use parking_lot::Mutex;
use taskboard_proto::model::{ListId, Task, TaskDraft, TaskId, TodoList, UserId};
use tokio::sync::watch;

use crate::adapter::ListTaskStore;
use crate::board::{Board, BoardAction};
use crate::error::{BoardError, ValidationError};
use crate::reorder::{self, Assignment, DragResult};
use crate::store::{DocumentStore, SubscriptionHandle};

/// Board state shared between the session and its live query callbacks.
#[derive(Clone)]
struct SharedBoard {
    board: Arc<Mutex<LiveBoard>>,
    updates: Arc<watch::Sender<u64>>,
}

struct LiveBoard {
    board: Board,
    /// Set by shutdown; snapshots that arrive afterwards are dropped.
    closed: bool,
}

impl SharedBoard {
    fn new() -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            board: Arc::new(Mutex::new(LiveBoard {
                board: Board::new(),
                closed: true,
            })),
            updates: Arc::new(updates),
        }
    }

    fn with_board<T>(&self, f: impl FnOnce(&Board) -> T) -> T {
        f(&self.board.lock().board)
    }

    fn dispatch(&self, action: BoardAction) {
        let revision = {
            let mut live = self.board.lock();
            let snapshot = matches!(
                action,
                BoardAction::ListsSnapshot(_) | BoardAction::TasksSnapshot(_)
            );
            if snapshot && live.closed {
                return;
            }
            live.board.apply(action);
            live.board.revision()
        };
        self.updates.send_replace(revision);
    }

    fn open(&self) {
        self.board.lock().closed = false;
    }

    fn close(&self) {
        let revision = {
            let mut live = self.board.lock();
            live.closed = true;
            live.board.apply(BoardAction::SignedOut);
            live.board.revision()
        };
        self.updates.send_replace(revision);
    }
}

/// One user's live board.
pub struct TodoSession<S> {
    user: UserId,
    adapter: ListTaskStore<S>,
    shared: SharedBoard,
    subscriptions: Mutex<Vec<SubscriptionHandle>>,
}

impl<S> std::fmt::Debug for TodoSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TodoSession")
            .field("user", &self.user)
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish_non_exhaustive()
    }
}

impl<S> TodoSession<S> {
    /// The signed-in user this session belongs to.
    #[must_use]
    pub const fn user(&self) -> &UserId {
        &self.user
    }

    /// The adapter the session writes through.
    #[must_use]
    pub const fn adapter(&self) -> &ListTaskStore<S> {
        &self.adapter
    }

    /// Returns `true` between [`TodoSession::start`] and
    /// [`TodoSession::shutdown`].
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.subscriptions.lock().is_empty()
    }

    /// A copy of the current board.
    #[must_use]
    pub fn board(&self) -> Board {
        self.shared.with_board(Board::clone)
    }

    /// Receiver that ticks with the board revision after every change.
    #[must_use]
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.shared.updates.subscribe()
    }
}

impl<S: DocumentStore> TodoSession<S> {
    /// Creates a session for `user`. Nothing is loaded until
    /// [`TodoSession::start`].
    #[must_use]
    pub fn new(user: UserId, adapter: ListTaskStore<S>) -> Self {
        Self {
            user,
            adapter,
            shared: SharedBoard::new(),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Subscribes to the user's lists and tasks.
    ///
    /// The initial snapshots are on the board when this returns; later ones
    /// are applied as they arrive. Calling it again restarts both live
    /// queries.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Store`] if either live query cannot be started.
    /// Nothing stays subscribed in that case.
    pub async fn start(&self) -> Result<(), BoardError> {
        let lists = self.adapter.watch_lists(&self.user).await?;
        let tasks = self.adapter.watch_tasks(&self.user).await?;

        self.shared.open();
        self.shared.dispatch(BoardAction::ListsSnapshot(lists.current()));
        self.shared.dispatch(BoardAction::TasksSnapshot(tasks.current()));

        let shared = self.shared.clone();
        let lists = lists.on_change(move |lists| shared.dispatch(BoardAction::ListsSnapshot(lists)));
        let shared = self.shared.clone();
        let tasks = tasks.on_change(move |tasks| shared.dispatch(BoardAction::TasksSnapshot(tasks)));

        let previous = std::mem::replace(&mut *self.subscriptions.lock(), vec![lists, tasks]);
        drop(previous);
        tracing::info!(user_id = %self.user, "session started");
        Ok(())
    }

    /// Cancels both live queries and clears the board.
    ///
    /// A callback that is already running when this is called cannot put
    /// its snapshot back on the board.
    pub fn shutdown(&self) {
        let handles = std::mem::take(&mut *self.subscriptions.lock());
        let count = handles.len();
        for handle in handles {
            handle.unsubscribe();
        }
        self.shared.close();
        tracing::info!(user_id = %self.user, subscriptions = count, "session shut down");
    }

    /// Creates a list.
    ///
    /// # Errors
    ///
    /// See [`ListTaskStore::create_list`].
    pub async fn add_list(&self, name: &str) -> Result<TodoList, BoardError> {
        self.adapter.create_list(name, &self.user).await
    }

    /// Renames a list.
    ///
    /// # Errors
    ///
    /// See [`ListTaskStore::rename_list`].
    pub async fn rename_list(&self, list_id: &ListId, new_name: &str) -> Result<(), BoardError> {
        self.adapter.rename_list(list_id, new_name).await
    }

    /// Deletes a list together with its tasks.
    ///
    /// # Errors
    ///
    /// See [`ListTaskStore::delete_list`].
    pub async fn delete_list(&self, list_id: &ListId) -> Result<(), BoardError> {
        self.adapter.delete_list(list_id).await
    }

    /// Adds a task to one of the user's lists.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownList`] if the board has no such
    /// list, otherwise see [`ListTaskStore::create_task`].
    pub async fn add_task(&self, list_id: &ListId, draft: &TaskDraft) -> Result<Task, BoardError> {
        if !self.shared.with_board(|b| b.list(list_id).is_some()) {
            return Err(ValidationError::UnknownList(list_id.clone()).into());
        }
        self.adapter.create_task(list_id, draft, &self.user).await
    }

    /// Deletes a task.
    ///
    /// # Errors
    ///
    /// See [`ListTaskStore::delete_task`].
    pub async fn delete_task(&self, task_id: &TaskId) -> Result<(), BoardError> {
        self.adapter.delete_task(task_id).await
    }

    /// Handles the end of a drag.
    ///
    /// The move is shown on the board immediately and then written to the
    /// store. If the write fails the task goes back to its previous column
    /// and the error is returned. Returns `Ok(None)` when the drag does not
    /// move anything.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownList`] if the destination column
    /// belongs to a list that is not on this user's board, and
    /// [`BoardError::Store`] if the write fails.
    pub async fn on_drag_end(&self, drag: &DragResult) -> Result<Option<Assignment>, BoardError> {
        let planned = self.shared.with_board(|board| {
            let assignment = reorder::plan(drag, board.tasks())?;
            if board.list(&assignment.to.list_id).is_none() {
                return Some(Err(assignment.to.list_id));
            }
            Some(Ok(assignment))
        });
        let assignment = match planned {
            None => return Ok(None),
            Some(Err(list_id)) => {
                tracing::debug!(task_id = %drag.task_id, list_id = %list_id, "drop onto unknown list refused");
                return Err(ValidationError::UnknownList(list_id).into());
            }
            Some(Ok(assignment)) => assignment,
        };
        self.shared
            .dispatch(BoardAction::MoveApplied(assignment.clone()));

        let write = self
            .adapter
            .update_task_assignment(
                &assignment.task_id,
                &assignment.to.list_id,
                assignment.to.priority,
            )
            .await;
        match write {
            Ok(()) => {
                self.shared
                    .dispatch(BoardAction::MoveConfirmed(assignment.clone()));
                Ok(Some(assignment))
            }
            Err(e) => {
                tracing::warn!(task_id = %assignment.task_id, error = %e, "move failed, rolling back");
                self.shared.dispatch(BoardAction::MoveFailed(assignment));
                Err(e)
            }
        }
    }

    /// [`TodoSession::on_drag_end`] for raw column ids as rendered by the
    /// view (`"{list_id}-{priority}"`).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Column`] for a malformed column id,
    /// otherwise see [`TodoSession::on_drag_end`].
    pub async fn move_task(
        &self,
        task_id: &str,
        source: &str,
        destination: &str,
    ) -> Result<Option<Assignment>, BoardError> {
        let drag = DragResult::parse(task_id, source, Some(destination))
            .map_err(ValidationError::from)?;
        self.on_drag_end(&drag).await
    }
}
