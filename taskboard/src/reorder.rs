//! Drag-and-drop reorder engine.
//!
//! Turns a finished drag into the task's new `(list, priority)` pair. Order
//! within a column is not persisted, so only column changes matter; a drop
//! back into the source column is a no-op.

use std::str::FromStr;

use taskboard_proto::model::{ColumnId, ColumnParseError, Task, TaskId};

/// Outcome of a drag gesture as reported by the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragResult {
    /// The dragged task.
    pub task_id: TaskId,
    /// Column the drag started in.
    pub source: ColumnId,
    /// Column the task was dropped on, `None` if dropped outside any column.
    pub destination: Option<ColumnId>,
}

impl DragResult {
    /// Builds a drag result from the view's raw column id strings.
    ///
    /// # Errors
    ///
    /// Returns [`ColumnParseError`] if either column id is malformed.
    pub fn parse(
        task_id: &str,
        source: &str,
        destination: Option<&str>,
    ) -> Result<Self, ColumnParseError> {
        Ok(Self {
            task_id: TaskId::new(task_id),
            source: ColumnId::from_str(source)?,
            destination: destination.map(ColumnId::from_str).transpose()?,
        })
    }
}

/// A task's move from one column to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// The moved task.
    pub task_id: TaskId,
    /// Column the task was in before the move.
    pub from: ColumnId,
    /// Column the task is in after the move.
    pub to: ColumnId,
}

/// Decides whether a drag moves a task, and where.
///
/// Returns `None` when the drop was cancelled, landed in the source column,
/// names a task that is not in `tasks`, or the task already sits in the
/// destination column.
#[must_use]
pub fn plan(drag: &DragResult, tasks: &[Task]) -> Option<Assignment> {
    let destination = drag.destination.as_ref()?;
    if *destination == drag.source {
        return None;
    }
    let Some(task) = tasks.iter().find(|t| t.id == drag.task_id) else {
        tracing::debug!(task_id = %drag.task_id, "dragged task not on board, ignoring drop");
        return None;
    };
    let from = task.column();
    if from == *destination {
        return None;
    }
    Some(Assignment {
        task_id: task.id.clone(),
        from,
        to: destination.clone(),
    })
}

/// Moves the assigned task into `assignment.to`. Every other field of every
/// task stays as it was. Returns `false` if the task is not present.
pub fn apply(tasks: &mut [Task], assignment: &Assignment) -> bool {
    set_column(tasks, &assignment.task_id, &assignment.to)
}

/// Undoes [`apply`], putting the task back into `assignment.from`.
pub fn revert(tasks: &mut [Task], assignment: &Assignment) -> bool {
    set_column(tasks, &assignment.task_id, &assignment.from)
}

fn set_column(tasks: &mut [Task], task_id: &TaskId, column: &ColumnId) -> bool {
    match tasks.iter_mut().find(|t| t.id == *task_id) {
        Some(task) => {
            task.list_id = column.list_id.clone();
            task.priority = column.priority;
            true
        }
        None => false,
    }
}

/// Runs a drag against a task collection.
///
/// Returns the collection with the moved task's column replaced, plus the
/// assignment to persist. When the drag is a no-op the collection comes back
/// unchanged and the assignment is `None`.
#[must_use]
pub fn reorder(mut tasks: Vec<Task>, drag: &DragResult) -> (Vec<Task>, Option<Assignment>) {
    let assignment = plan(drag, &tasks);
    if let Some(assignment) = &assignment {
        apply(&mut tasks, assignment);
    }
    (tasks, assignment)
}
