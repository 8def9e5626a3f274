//! In-memory board state, driven by a reducer.
//!
//! The board holds the latest list and task snapshots plus the optimistic
//! moves that have been applied locally but not yet confirmed by the store.
//! All changes go through [`Board::apply`], which keeps the reconciliation
//! rules in one place:
//!
//! - a move shows up on the board as soon as it is applied;
//! - a task snapshot that does not reflect a pending move yet gets the move
//!   re-applied on top, so the board does not flicker back;
//! - a snapshot that already reflects the move settles it;
//! - a failed move is rolled back to the column the task came from.

use std::collections::HashMap;

use taskboard_proto::model::{ColumnId, ListId, Priority, Task, TaskId, TodoList};

use crate::reorder::{self, Assignment};

/// Everything that can change the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardAction {
    /// Latest full set of the user's lists.
    ListsSnapshot(Vec<TodoList>),
    /// Latest full set of the user's tasks.
    TasksSnapshot(Vec<Task>),
    /// A move was applied locally and sent to the store.
    MoveApplied(Assignment),
    /// The store accepted the move.
    MoveConfirmed(Assignment),
    /// The store rejected the move.
    MoveFailed(Assignment),
    /// The user signed out; forget everything.
    SignedOut,
}

/// Lists, tasks and in-flight moves of one signed-in user.
#[derive(Debug, Clone, Default)]
pub struct Board {
    lists: Vec<TodoList>,
    tasks: Vec<Task>,
    pending: HashMap<TaskId, Assignment>,
    revision: u64,
}

impl Board {
    /// An empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one action and bumps the revision.
    pub fn apply(&mut self, action: BoardAction) {
        match action {
            BoardAction::ListsSnapshot(lists) => {
                self.lists = lists;
            }
            BoardAction::TasksSnapshot(tasks) => {
                self.tasks = tasks;
                let tasks = &mut self.tasks;
                self.pending.retain(|task_id, assignment| {
                    let current = tasks.iter().find(|t| t.id == *task_id).map(Task::column);
                    match current {
                        None => false,
                        Some(column) if column == assignment.to => false,
                        Some(_) => reorder::apply(tasks, assignment),
                    }
                });
            }
            BoardAction::MoveApplied(assignment) => {
                if reorder::apply(&mut self.tasks, &assignment) {
                    self.pending.insert(assignment.task_id.clone(), assignment);
                }
            }
            BoardAction::MoveConfirmed(assignment) => {
                if self.pending.get(&assignment.task_id) == Some(&assignment) {
                    self.pending.remove(&assignment.task_id);
                }
            }
            BoardAction::MoveFailed(assignment) => {
                if self.pending.get(&assignment.task_id) == Some(&assignment) {
                    self.pending.remove(&assignment.task_id);
                }
                // Only roll back if nothing newer moved the task since.
                let still_there = self
                    .task(&assignment.task_id)
                    .is_some_and(|t| t.column() == assignment.to);
                if still_there {
                    reorder::revert(&mut self.tasks, &assignment);
                }
            }
            BoardAction::SignedOut => {
                self.lists.clear();
                self.tasks.clear();
                self.pending.clear();
            }
        }
        self.revision += 1;
    }

    /// Number of actions applied so far.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Lists in snapshot order.
    #[must_use]
    pub fn lists(&self) -> &[TodoList] {
        &self.lists
    }

    /// Tasks in snapshot order, with pending moves applied.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Looks up a list.
    #[must_use]
    pub fn list(&self, list_id: &ListId) -> Option<&TodoList> {
        self.lists.iter().find(|l| l.id == *list_id)
    }

    /// Looks up a task.
    #[must_use]
    pub fn task(&self, task_id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == *task_id)
    }

    /// Tasks in one column, in snapshot order.
    #[must_use]
    pub fn column(&self, column: &ColumnId) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.list_id == column.list_id && t.priority == column.priority)
            .collect()
    }

    /// The three columns of a list, in priority order.
    #[must_use]
    pub fn columns(&self, list_id: &ListId) -> Vec<(ColumnId, Vec<&Task>)> {
        Priority::ALL
            .iter()
            .map(|&priority| {
                let column = ColumnId::new(list_id.clone(), priority);
                let tasks = self.column(&column);
                (column, tasks)
            })
            .collect()
    }

    /// Returns `true` if a move of this task awaits confirmation.
    #[must_use]
    pub fn is_pending(&self, task_id: &TaskId) -> bool {
        self.pending.contains_key(task_id)
    }

    /// Number of moves awaiting confirmation.
    #[must_use]
    pub fn pending_moves(&self) -> usize {
        self.pending.len()
    }
}
