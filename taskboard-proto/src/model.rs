//! Typed entities: users, lists, tasks, priorities, and priority columns.
//!
//! Lists and tasks live in the store as [`Document`]s; `from_document`
//! normalizes them and rejects records with missing or malformed fields.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::document::{Document, DocumentError, DocumentId};

/// Collection names used by the backend.
pub mod collections {
    /// Collection holding [`TodoList`](super::TodoList) documents.
    pub const LISTS: &str = "lists";
    /// Collection holding [`Task`](super::Task) documents.
    pub const TASKS: &str = "tasks";
}

/// Document field names.
pub mod fields {
    /// Owning user of a list or task.
    pub const USER_ID: &str = "userId";
    /// List display name.
    pub const NAME: &str = "name";
    /// Task title.
    pub const TITLE: &str = "title";
    /// Task description.
    pub const DESCRIPTION: &str = "description";
    /// Task due date (`YYYY-MM-DD`).
    pub const DUE_DATE: &str = "dueDate";
    /// Task priority (`Low`, `Medium`, `High`).
    pub const PRIORITY: &str = "priority";
    /// List a task belongs to.
    pub const LIST_ID: &str = "listId";
}

/// Wire format of due dates.
pub const DUE_DATE_FORMAT: &str = "%Y-%m-%d";

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an identifier string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns the store document id for this entity.
            #[must_use]
            pub fn to_document_id(&self) -> DocumentId {
                DocumentId::new(self.0.clone())
            }
        }

        impl From<DocumentId> for $name {
            fn from(id: DocumentId) -> Self {
                Self(id.as_str().to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

entity_id!(
    /// Identity issued by the identity provider.
    UserId
);
entity_id!(
    /// Identifier of a [`TodoList`].
    ListId
);
entity_id!(
    /// Identifier of a [`Task`].
    TaskId
);

/// Task priority, which is also the task's column within its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    /// Low priority.
    Low,
    /// Medium priority.
    Medium,
    /// High priority.
    High,
}

impl Priority {
    /// All priorities in column order.
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    /// Canonical text form, as stored in documents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when text is not a known priority.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown priority {0:?} (expected Low, Medium or High)")]
pub struct ParsePriorityError(pub String);

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParsePriorityError(s.to_string()))
    }
}

/// A named grouping of tasks owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoList {
    /// Store-assigned id.
    pub id: ListId,
    /// Display name (never empty).
    pub name: String,
    /// Owning user.
    pub owner_id: UserId,
}

impl TodoList {
    /// Normalizes a `lists` document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] if `name` or `userId` is missing or not text.
    pub fn from_document(doc: &Document) -> Result<Self, DocumentError> {
        Ok(Self {
            id: ListId::from(doc.id.clone()),
            name: doc.text(fields::NAME)?.to_string(),
            owner_id: UserId::new(doc.text(fields::USER_ID)?),
        })
    }
}

/// A single todo item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned id.
    pub id: TaskId,
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Calendar due date.
    pub due_date: NaiveDate,
    /// Priority, which selects the task's column.
    pub priority: Priority,
    /// List the task belongs to.
    pub list_id: ListId,
    /// Owning user.
    pub owner_id: UserId,
}

impl Task {
    /// Normalizes a `tasks` document.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] if a field is missing, not text, or holds
    /// an unknown priority or a malformed due date.
    pub fn from_document(doc: &Document) -> Result<Self, DocumentError> {
        let priority_text = doc.text(fields::PRIORITY)?;
        let priority = priority_text
            .parse()
            .map_err(|_| DocumentError::InvalidValue {
                id: doc.id.clone(),
                field: fields::PRIORITY,
                value: priority_text.to_string(),
            })?;
        let due_text = doc.text(fields::DUE_DATE)?;
        let due_date = NaiveDate::parse_from_str(due_text, DUE_DATE_FORMAT).map_err(|_| {
            DocumentError::InvalidValue {
                id: doc.id.clone(),
                field: fields::DUE_DATE,
                value: due_text.to_string(),
            }
        })?;

        Ok(Self {
            id: TaskId::from(doc.id.clone()),
            title: doc.text(fields::TITLE)?.to_string(),
            description: doc.text(fields::DESCRIPTION)?.to_string(),
            due_date,
            priority,
            list_id: ListId::new(doc.text(fields::LIST_ID)?),
            owner_id: UserId::new(doc.text(fields::USER_ID)?),
        })
    }

    /// Returns the column this task currently sits in.
    #[must_use]
    pub fn column(&self) -> ColumnId {
        ColumnId::new(self.list_id.clone(), self.priority)
    }
}

/// Raw form input for a new task, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    /// Task title.
    pub title: String,
    /// Task description.
    pub description: String,
    /// Due date text, expected as `YYYY-MM-DD`.
    pub due_date: String,
    /// Selected priority, `None` while the form is unset.
    pub priority: Option<Priority>,
}

/// A priority column: the `(list, priority)` pair a task is dropped into.
///
/// Renders as `"{list_id}-{priority}"`. Parsing splits on the last `-`,
/// so list ids that contain dashes round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnId {
    /// List the column belongs to.
    pub list_id: ListId,
    /// Priority the column groups.
    pub priority: Priority,
}

impl ColumnId {
    /// Creates a column id from its parts.
    #[must_use]
    pub const fn new(list_id: ListId, priority: Priority) -> Self {
        Self { list_id, priority }
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.list_id, self.priority)
    }
}

/// Errors from parsing a [`ColumnId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ColumnParseError {
    /// No `-` separator, or an empty list id.
    #[error("malformed column id {0:?}")]
    Malformed(String),
    /// The suffix is not a priority.
    #[error("column id {column:?}: {source}")]
    Priority {
        /// The rejected column id.
        column: String,
        /// Underlying priority error.
        source: ParsePriorityError,
    },
}

impl FromStr for ColumnId {
    type Err = ColumnParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (list, priority) = s
            .rsplit_once('-')
            .filter(|(list, _)| !list.is_empty())
            .ok_or_else(|| ColumnParseError::Malformed(s.to_string()))?;
        let priority = priority
            .parse()
            .map_err(|source| ColumnParseError::Priority {
                column: s.to_string(),
                source,
            })?;
        Ok(Self::new(ListId::new(list), priority))
    }
}
